//! Incremental detokenizer.
//!
//! Sentencepiece and byte-level vocabularies split characters across tokens,
//! so decoding one token at a time can yield broken UTF-8 or lose the leading
//! space. Text is emitted only once the decoded window has grown and does not
//! end in a replacement character.

use tokenizers::Tokenizer;

use localqa_core::{Error, Result};

pub struct TokenOutputStream<'a> {
    tokenizer: &'a Tokenizer,
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl<'a> TokenOutputStream<'a> {
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self { tokenizer, tokens: Vec::new(), prev_index: 0, current_index: 0 }
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| Error::GenerationAborted(format!("detokenize: {e}")))
    }

    /// Feed one token; returns the newly completed text, if any.
    pub fn next_token(&mut self, token: u32) -> Result<Option<String>> {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            self.decode(&self.tokens[self.prev_index..self.current_index])?
        };
        self.tokens.push(token);
        let text = self.decode(&self.tokens[self.prev_index..])?;
        Ok(self.take_new(prev_text.len(), text))
    }

    /// Flush whatever is still held back at the end of generation.
    pub fn decode_rest(&mut self) -> Result<Option<String>> {
        if self.current_index >= self.tokens.len() { return Ok(None); }
        let prev_text = self.decode(&self.tokens[self.prev_index..self.current_index])?;
        let text = self.decode(&self.tokens[self.prev_index..])?;
        match text.get(prev_text.len()..) {
            Some(rest) if !rest.is_empty() => {
                self.prev_index = self.current_index;
                self.current_index = self.tokens.len();
                Ok(Some(rest.to_string()))
            }
            _ => Ok(None),
        }
    }

    fn take_new(&mut self, prev_len: usize, text: String) -> Option<String> {
        if text.len() <= prev_len || text.ends_with('\u{FFFD}') { return None; }
        let new = text.get(prev_len..)?.to_string();
        self.prev_index = self.current_index;
        self.current_index = self.tokens.len();
        Some(new)
    }
}
