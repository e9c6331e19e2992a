//! localqa-generate
//!
//! Text generation backends. Exactly one engine runs per process; it is
//! chosen once from `model_type` by [`build_engine`] and shared behind an
//! `Arc` by every request.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use localqa_core::config::PipelineConfig;
use localqa_core::traits::GenerationEngine;
use localqa_core::{Error, Result};

pub mod detok;
pub mod llama_cpp;
pub mod ollama;

pub use llama_cpp::LlamaCppEngine;
pub use ollama::OllamaEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// GGUF model run in-process.
    LlamaCpp,
    /// GPT4All GGUF checkpoint, run by the same in-process runtime as `LlamaCpp`.
    Gpt4All,
    /// Model served by a local Ollama runtime.
    Ollama,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LlamaCpp => "LlamaCpp",
            BackendKind::Gpt4All => "GPT4All",
            BackendKind::Ollama => "Ollama",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for BackendKind {
    type Err = Error;

    /// Case and punctuation insensitive: `LlamaCpp`, `llama-cpp`, `llama_cpp`,
    /// `gguf`, `GPT4All`, `gpt-4-all` and `Ollama` are accepted.
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_ascii_lowercase();
        match key.as_str() {
            "llamacpp" | "gguf" => Ok(BackendKind::LlamaCpp),
            "gpt4all" => Ok(BackendKind::Gpt4All),
            "ollama" => Ok(BackendKind::Ollama),
            _ => Err(Error::UnsupportedBackend(s.to_string())),
        }
    }
}

/// Build the configured engine. LlamaCpp and GPT4All load the GGUF weights here;
/// Ollama checks that the model tag is installed.
pub async fn build_engine(config: &PipelineConfig) -> Result<Arc<dyn GenerationEngine>> {
    let kind: BackendKind = config.model_type.parse()?;
    tracing::info!(backend = %kind, model = %config.model_path, n_ctx = config.model_n_ctx, "building generation engine");
    let engine: Arc<dyn GenerationEngine> = match kind {
        BackendKind::LlamaCpp | BackendKind::Gpt4All => Arc::new(LlamaCppEngine::load_as(config, kind)?),
        BackendKind::Ollama => Arc::new(OllamaEngine::connect(config).await?),
    };
    Ok(engine)
}
