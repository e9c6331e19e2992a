//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + the legacy unprefixed variables (`MODEL_TYPE`, `PERSIST_DIRECTORY`, ...)
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_PIPELINE__MODEL_N_CTX`).
//! The result is validated once and handed to the rest of the process as an
//! immutable [`AppConfig`].

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Unprefixed variable names accepted for compatibility with existing `.env` files.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("EMBEDDINGS_MODEL_NAME", "pipeline.embeddings_model_name"),
    ("PERSIST_DIRECTORY", "pipeline.persist_directory"),
    ("MODEL_TYPE", "pipeline.model_type"),
    ("MODEL_PATH", "pipeline.model_path"),
    ("MODEL_N_CTX", "pipeline.model_n_ctx"),
    ("TARGET_SOURCE_CHUNKS", "pipeline.target_source_chunks"),
    ("APP_USE_FAKE_EMBEDDINGS", "pipeline.use_fake_embeddings"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self { Self { host: "127.0.0.1".to_string(), port: 5000 } }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    Dot,
}

/// Everything the answer pipeline needs, read once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// HF hub id or local directory of the encoder used to build the index.
    pub embeddings_model_name: String,
    #[serde(deserialize_with = "figment::util::bool_from_str_or_int")]
    pub normalize_embeddings: bool,
    /// `1`/`true` selects the hashing encoder; handy for smoke tests without model weights.
    #[serde(deserialize_with = "figment::util::bool_from_str_or_int")]
    pub use_fake_embeddings: bool,
    pub persist_directory: String,
    pub table_name: String,
    pub distance_metric: DistanceMetric,
    pub nprobes: Option<usize>,
    pub refine_factor: Option<u32>,
    /// Backend kind; parsed by the engine factory so unknown kinds fail there.
    pub model_type: String,
    /// GGUF file for `LlamaCpp`, model tag for `Ollama`.
    pub model_path: String,
    pub tokenizer_path: Option<String>,
    pub ollama_url: String,
    pub model_n_ctx: usize,
    pub max_tokens: usize,
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub repeat_penalty: f32,
    pub seed: u64,
    pub generation_timeout_secs: Option<u64>,
    pub target_source_chunks: usize,
    #[serde(deserialize_with = "figment::util::bool_from_str_or_int")]
    pub stream_tokens: bool,
    #[serde(deserialize_with = "figment::util::bool_from_str_or_int")]
    pub include_sources: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embeddings_model_name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            normalize_embeddings: true,
            use_fake_embeddings: false,
            persist_directory: "db".to_string(),
            table_name: "documents".to_string(),
            distance_metric: DistanceMetric::Cosine,
            nprobes: None,
            refine_factor: None,
            model_type: "LlamaCpp".to_string(),
            model_path: "models/model.gguf".to_string(),
            tokenizer_path: None,
            ollama_url: "http://127.0.0.1:11434".to_string(),
            model_n_ctx: 1000,
            max_tokens: 256,
            temperature: 0.8,
            top_p: None,
            repeat_penalty: 1.1,
            seed: 299_792_458,
            generation_timeout_secs: None,
            target_source_chunks: 4,
            stream_tokens: true,
            include_sources: true,
        }
    }
}

impl PipelineConfig {
    pub fn top_k(&self) -> usize { self.target_source_chunks.max(1) }

    pub fn validate(&self) -> Result<()> {
        if self.target_source_chunks == 0 {
            return Err(Error::InvalidConfig("target_source_chunks must be at least 1".into()));
        }
        if self.model_n_ctx <= self.max_tokens {
            return Err(Error::InvalidConfig(format!(
                "model_n_ctx ({}) must be larger than max_tokens ({})",
                self.model_n_ctx, self.max_tokens
            )));
        }
        if self.persist_directory.trim().is_empty() {
            return Err(Error::InvalidConfig("persist_directory is empty".into()));
        }
        if self.model_path.trim().is_empty() {
            return Err(Error::InvalidConfig("model_path is empty".into()));
        }
        if self.temperature.is_nan() || self.temperature < 0.0 {
            return Err(Error::InvalidConfig(format!("temperature must be >= 0, got {}", self.temperature)));
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        self.persist_directory = expand_path(&self.persist_directory).to_string_lossy().into_owned();
        self.model_path = expand_path(&self.model_path).to_string_lossy().into_owned();
        if let Some(p) = self.tokenizer_path.as_mut() {
            *p = expand_path(&*p).to_string_lossy().into_owned();
        }
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let config = Self::for_env(&env_name);
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn for_env(env_name: &str) -> Self {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        let legacy: Vec<&str> = LEGACY_ENV.iter().map(|(from, _)| *from).collect();
        figment = figment
            .merge(Env::raw().only(&legacy).map(|key| {
                LEGACY_ENV
                    .iter()
                    .find(|(from, _)| key.as_str().eq_ignore_ascii_case(from))
                    .map(|(_, to)| *to)
                    .unwrap_or(key.as_str())
                    .into()
            }))
            .merge(Env::prefixed("APP_").split("__"));
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// Extract, expand paths and validate the full application config.
    pub fn app(&self) -> Result<AppConfig> {
        let mut app: AppConfig = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        app.pipeline.expand_paths();
        app.pipeline.validate()?;
        Ok(app)
    }

    fn validate_for_env(&self, env: &str) -> Result<()> {
        match env {
            "dev" | "development" | "prod" | "production" | "test" | "testing" => Ok(()),
            other => {
                tracing::warn!(env = other, "unknown RUST_ENV, only config.toml and env vars apply");
                Ok(())
            }
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
