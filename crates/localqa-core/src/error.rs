use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Generation aborted: {0}")]
    GenerationAborted(String),
}

impl Error {
    /// Stable snake_case name, used as the `kind` field of error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "invalid_config",
            Error::Encoding(_) => "encoding_error",
            Error::IndexUnavailable(_) => "index_unavailable",
            Error::UnsupportedBackend(_) => "unsupported_backend",
            Error::ModelLoad(_) => "model_load_error",
            Error::GenerationAborted(_) => "generation_aborted",
        }
    }

    /// Construction-time failures prevent the pipeline from being built at all.
    pub fn is_startup(&self) -> bool {
        matches!(self, Error::InvalidConfig(_) | Error::UnsupportedBackend(_) | Error::ModelLoad(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
