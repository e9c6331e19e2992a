//! Single accumulation point for generated text.
//!
//! Backends push every chunk through a `Transcript`; it forwards the chunk to
//! the optional sink and appends it to the buffered answer in one step, so the
//! streamed and buffered views can never diverge.

use crate::types::GenerationResult;

pub struct Transcript<'a> {
    text: String,
    chunks: usize,
    sink: Option<&'a mut dyn FnMut(&str)>,
}

impl<'a> Transcript<'a> {
    pub fn new(sink: Option<&'a mut dyn FnMut(&str)>) -> Self {
        Self { text: String::new(), chunks: 0, sink }
    }

    pub fn push(&mut self, chunk: &str) {
        if chunk.is_empty() { return; }
        if let Some(sink) = self.sink.as_deref_mut() { sink(chunk); }
        self.text.push_str(chunk);
        self.chunks += 1;
    }

    pub fn is_streaming(&self) -> bool { self.sink.is_some() }
    pub fn chunks(&self) -> usize { self.chunks }
    pub fn text(&self) -> &str { &self.text }

    pub fn finish(self, terminated_normally: bool) -> GenerationResult {
        GenerationResult { answer_text: self.text, terminated_normally }
    }
}
