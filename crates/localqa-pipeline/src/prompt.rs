//! Prompt assembly for the "stuff" QA chain: every retrieved passage is
//! stuffed into one prompt ahead of the question.

use localqa_core::traits::GenerationEngine;
use localqa_core::types::{Prompt, RankedPassage};

const PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Render the prompt for `query` over `passages`, in the order given.
pub fn render(query: &str, passages: &[RankedPassage]) -> String {
    let context = passages.iter().map(|p| p.passage.text.as_str()).collect::<Vec<_>>().join("\n\n");
    format!("{PREAMBLE}\n\n{context}\n\nQuestion: {query}\nHelpful Answer:")
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub prompt: Prompt,
    /// Exactly the passages rendered into `prompt`, best first.
    pub passages: Vec<RankedPassage>,
    /// How many of the lowest-ranked passages were left out to fit the budget.
    pub dropped: usize,
}

/// Fits retrieved passages into the engine's input budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptAssembler {
    budget: usize,
}

impl PromptAssembler {
    /// Room left for the prompt once `max_tokens` are reserved for the answer.
    pub fn new(context_window: usize, max_tokens: usize) -> Self {
        Self { budget: context_window.saturating_sub(max_tokens) }
    }

    pub fn with_budget(budget: usize) -> Self { Self { budget } }

    pub fn for_engine(engine: &dyn GenerationEngine) -> Self {
        Self::new(engine.context_window(), engine.max_tokens())
    }

    pub fn budget(&self) -> usize { self.budget }

    /// Drops whole passages, lowest rank first, until the prompt fits. A prompt
    /// that is still too long with no passages is returned unchanged.
    pub fn assemble<F>(&self, query: &str, mut passages: Vec<RankedPassage>, count_tokens: F) -> AssembledPrompt
    where
        F: Fn(&str) -> usize,
    {
        passages.sort_by_key(|p| p.rank);
        let mut dropped = 0;
        let mut text = render(query, &passages);
        while !passages.is_empty() && count_tokens(&text) > self.budget {
            passages.pop();
            dropped += 1;
            text = render(query, &passages);
        }
        AssembledPrompt { prompt: Prompt::new(text), passages, dropped }
    }
}
