//! localqa-embed
//!
//! Query encoder for the answer pipeline. Loads a BERT or XLM-RoBERTa
//! sentence encoder with candle (from a local directory or the HF hub), pools
//! the last hidden state with a masked mean and optionally L2-normalises it,
//! which must mirror how the document index was built.

use anyhow::{Context, Result, anyhow, bail};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::xlm_roberta::{XLMRobertaModel, Config as XLMRobertaConfig};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::Tokenizer;

use localqa_core::config::PipelineConfig;
use localqa_core::traits::Embedder;
use localqa_core::Error;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::{l2_normalize, masked_mean, masked_mean_l2};

/// Dimension of the hashing encoder used for development and tests.
pub const FAKE_EMBEDDING_DIM: usize = 384;

enum Encoder {
    Bert(BertModel),
    XlmRoberta(XLMRobertaModel),
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

pub struct EmbeddingModel {
    encoder: Encoder,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
    dim: usize,
    max_len: usize,
    normalize: bool,
}

impl EmbeddingModel {
    /// Load the encoder named by `model_name`: a local directory holding
    /// `config.json`, `tokenizer.json` and weights, or a HF hub model id.
    pub fn load(model_name: &str, normalize: bool) -> Result<Self> {
        let started = Instant::now();
        let device = device::select_device();
        let files = resolve_model_files(model_name)?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", files.tokenizer.display(), e))?;
        let raw_config = std::fs::read_to_string(&files.config)
            .with_context(|| format!("Failed to read {}", files.config.display()))?;
        let meta: serde_json::Value = serde_json::from_str(&raw_config)?;
        let model_type = meta.get("model_type").and_then(|v| v.as_str()).unwrap_or("bert").to_string();
        let dim = meta
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;
        let max_positions = meta.get("max_position_embeddings").and_then(|v| v.as_u64()).unwrap_or(512) as usize;

        let vb = load_weights(&files.weights, &device)?;
        let (encoder, max_len) = match model_type.as_str() {
            "bert" => {
                let config: BertConfig = serde_json::from_str(&raw_config)?;
                (Encoder::Bert(BertModel::load(vb, &config)?), max_positions.min(512))
            }
            "xlm-roberta" => {
                let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
                // RoBERTa position ids start after the padding index.
                (Encoder::XlmRoberta(XLMRobertaModel::new(&config, vb)?), max_positions.saturating_sub(2).min(512))
            }
            other => bail!("Unsupported encoder architecture '{}'", other),
        };

        let id = format!("{}:{}:d{}", model_name, if normalize { "l2" } else { "raw" }, dim);
        tracing::info!(model = model_name, architecture = %model_type, dim, max_len, elapsed_ms = started.elapsed().as_millis() as u64, "encoder loaded");
        Ok(Self { encoder, tokenizer, device, id, dim, max_len, normalize })
    }

    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let started = Instant::now();
        let Some((input_ids, attention_mask)) = tokenize::tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)? else {
            return Ok(vec![0f32; self.dim]);
        };
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = match &self.encoder {
            Encoder::Bert(model) => model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?,
            Encoder::XlmRoberta(model) => model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?,
        };
        let pooled = if self.normalize { masked_mean_l2(&hidden, &attention_mask)? } else { masked_mean(&hidden, &attention_mask)? };
        let emb: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if emb.len() != self.dim { bail!("encoder produced {} values, expected {}", emb.len(), self.dim); }
        if started.elapsed().as_millis() > 100 {
            tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "slow embedding");
        }
        Ok(emb)
    }
}

impl Embedder for EmbeddingModel {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_text(&self, text: &str) -> localqa_core::Result<Vec<f32>> {
        self.encode(text).map_err(|e| Error::Encoding(format!("{e:#}")))
    }
}

/// Deterministic hashing encoder: each whitespace token bumps one bucket.
pub struct FakeEmbedder { dim: usize, id: String }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, id: format!("fake:d{dim}") } }
}

impl Embedder for FakeEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_text(&self, text: &str) -> localqa_core::Result<Vec<f32>> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        Ok(v)
    }
}

/// Build the encoder named by the pipeline config.
pub fn get_embedder(config: &PipelineConfig) -> localqa_core::Result<Box<dyn Embedder>> {
    if config.use_fake_embeddings {
        tracing::warn!(dim = FAKE_EMBEDDING_DIM, "using the hashing FakeEmbedder");
        return Ok(Box::new(FakeEmbedder::new(FAKE_EMBEDDING_DIM)));
    }
    let model = EmbeddingModel::load(&config.embeddings_model_name, config.normalize_embeddings)
        .map_err(|e| Error::ModelLoad(format!("embeddings model '{}': {e:#}", config.embeddings_model_name)))?;
    Ok(Box::new(model))
}

fn resolve_model_files(model_name: &str) -> Result<ModelFiles> {
    let local = Path::new(model_name);
    if local.is_dir() {
        tracing::info!(dir = %local.display(), "using local encoder directory");
        let weights = ["model.safetensors", "pytorch_model.bin"]
            .iter()
            .map(|f| local.join(f))
            .find(|p| p.exists())
            .ok_or_else(|| anyhow!("No model.safetensors or pytorch_model.bin in {}", local.display()))?;
        return Ok(ModelFiles { config: local.join("config.json"), tokenizer: local.join("tokenizer.json"), weights });
    }

    let api = Api::new().context("Failed to create HuggingFace API client")?;
    let repo = api.repo(Repo::new(model_name.to_string(), RepoType::Model));
    let config = repo.get("config.json").context("Failed to download model config")?;
    let tokenizer = repo.get("tokenizer.json").context("Failed to download tokenizer")?;
    let weights = match repo.get("model.safetensors") {
        Ok(p) => p,
        Err(_) => repo.get("pytorch_model.bin").context("Failed to download model weights")?,
    };
    Ok(ModelFiles { config, tokenizer, weights })
}

fn load_weights(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let is_safetensors = path.extension().and_then(|e| e.to_str()) == Some("safetensors");
    if is_safetensors {
        // SAFETY: the weights file is opened read-only and not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };
        return Ok(vb);
    }
    let weights = candle_core::pickle::read_all(path)?;
    let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}
