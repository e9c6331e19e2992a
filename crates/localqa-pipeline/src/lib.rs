//! localqa-pipeline
//!
//! The question-answering flow: retrieve the closest passages, stuff them
//! into a prompt that fits the engine's context window, generate, and
//! attach the passages actually used as citations.

pub mod pipeline;
pub mod prompt;

pub use pipeline::{Answer, AnswerOptions, AnswerPipeline, AnswerStats, Citation};
pub use prompt::{AssembledPrompt, PromptAssembler};
