//! In-process GGUF generation with candle's quantized llama.
//!
//! The model keeps a KV cache across `forward` calls, so a single instance
//! cannot serve two prompts at once; the weights live behind a `Mutex` and
//! concurrent requests queue on it.
//!
//! GPT4All model files are GGUF too, so the `GPT4All` backend is this same
//! engine loaded under its own name.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use candle_transformers::utils::apply_repeat_penalty;
use tokenizers::Tokenizer;

use localqa_core::config::PipelineConfig;
use localqa_core::traits::{estimate_tokens, GenerationEngine};
use localqa_core::transcript::Transcript;
use localqa_core::types::{GenerationResult, Prompt};
use localqa_core::{Error, Result};

use crate::detok::TokenOutputStream;
use crate::BackendKind;

/// Tokens looked back over when applying the repeat penalty.
const REPEAT_LAST_N: usize = 64;

/// End-of-sequence spellings across llama, llama-3, chatml and gemma vocabularies.
const EOS_TOKENS: &[&str] = &["</s>", "<|eot_id|>", "<|end_of_text|>", "<|im_end|>", "<eos>"];

pub struct LlamaCppEngine {
    backend: BackendKind,
    model: Mutex<ModelWeights>,
    tokenizer: Tokenizer,
    device: Device,
    eos_ids: Vec<u32>,
    context_window: usize,
    max_tokens: usize,
    temperature: f64,
    top_p: Option<f64>,
    repeat_penalty: f32,
    seed: u64,
    timeout: Option<Duration>,
}

fn load_err(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::ModelLoad(format!("{}: {}", path.display(), e))
}

fn aborted(e: impl std::fmt::Display) -> Error { Error::GenerationAborted(e.to_string()) }

impl LlamaCppEngine {
    pub fn load(config: &PipelineConfig) -> Result<Self> { Self::load_as(config, BackendKind::LlamaCpp) }

    /// Load the GGUF file at `model_path` and report it as `backend`.
    pub fn load_as(config: &PipelineConfig, backend: BackendKind) -> Result<Self> {
        let started = Instant::now();
        let model_path = PathBuf::from(&config.model_path);
        if !model_path.is_file() {
            return Err(Error::ModelLoad(format!("model file not found: {}", model_path.display())));
        }
        let tokenizer_path = config
            .tokenizer_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| model_path.with_file_name("tokenizer.json"));
        if !tokenizer_path.is_file() {
            return Err(Error::ModelLoad(format!("tokenizer not found: {}", tokenizer_path.display())));
        }
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| load_err(&tokenizer_path, e))?;

        let device = Device::Cpu;
        let mut file = std::fs::File::open(&model_path).map_err(|e| load_err(&model_path, e))?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| load_err(&model_path, e))?;
        let mut eos_ids: Vec<u32> = EOS_TOKENS.iter().filter_map(|t| tokenizer.token_to_id(t)).collect();
        if let Some(id) = content.metadata.get("tokenizer.ggml.eos_token_id").and_then(|v| v.to_u32().ok()) {
            if !eos_ids.contains(&id) { eos_ids.push(id); }
        }
        let tensors = content.tensor_infos.len();
        let model = ModelWeights::from_gguf(content, &mut file, &device).map_err(|e| load_err(&model_path, e))?;

        tracing::info!(
            backend = %backend,
            model = %model_path.display(),
            tensors,
            eos = ?eos_ids,
            n_ctx = config.model_n_ctx,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gguf model loaded"
        );
        Ok(Self {
            backend,
            model: Mutex::new(model),
            tokenizer,
            device,
            eos_ids,
            context_window: config.model_n_ctx,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            repeat_penalty: config.repeat_penalty,
            seed: config.seed,
            timeout: config.generation_timeout_secs.map(Duration::from_secs),
        })
    }

    fn next_logits(&self, model: &mut ModelWeights, input: &[u32], index_pos: usize, history: &[u32]) -> Result<Tensor> {
        let input = Tensor::new(input, &self.device).and_then(|t| t.unsqueeze(0)).map_err(aborted)?;
        let logits = model.forward(&input, index_pos).and_then(|l| l.squeeze(0)).map_err(aborted)?;
        if self.repeat_penalty == 1.0 {
            return Ok(logits);
        }
        let start = history.len().saturating_sub(REPEAT_LAST_N);
        apply_repeat_penalty(&logits, self.repeat_penalty, &history[start..]).map_err(aborted)
    }
}

impl GenerationEngine for LlamaCppEngine {
    fn backend_name(&self) -> &'static str { self.backend.as_str() }
    fn context_window(&self) -> usize { self.context_window }
    fn max_tokens(&self) -> usize { self.max_tokens }

    fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.encode(text, true).map(|e| e.len()).unwrap_or_else(|_| estimate_tokens(text))
    }

    fn generate(&self, prompt: &Prompt, sink: Option<&mut dyn FnMut(&str)>) -> Result<GenerationResult> {
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let prompt_tokens = self
            .tokenizer
            .encode(prompt.as_str(), true)
            .map_err(|e| Error::GenerationAborted(format!("tokenize prompt: {e}")))?
            .get_ids()
            .to_vec();
        if prompt_tokens.is_empty() {
            return Err(Error::GenerationAborted("prompt produced no tokens".into()));
        }
        if prompt_tokens.len() >= self.context_window {
            return Err(Error::GenerationAborted(format!(
                "prompt has {} tokens, context window is {}",
                prompt_tokens.len(),
                self.context_window
            )));
        }
        let budget = self.max_tokens.min(self.context_window - prompt_tokens.len());

        let mut model = self.model.lock().map_err(|_| Error::GenerationAborted("model state poisoned by an earlier panic".into()))?;
        let waited_ms = started.elapsed().as_millis() as u64;
        let temperature = (self.temperature > 0.0).then_some(self.temperature);
        let mut sampler = LogitsProcessor::new(self.seed, temperature, self.top_p);
        let mut detok = TokenOutputStream::new(&self.tokenizer);
        let mut transcript = Transcript::new(sink);
        let mut history = prompt_tokens.clone();

        // index_pos 0 discards the KV cache left by the previous prompt.
        let logits = self.next_logits(&mut model, &prompt_tokens, 0, &history)?;
        let mut next = sampler.sample(&logits).map_err(aborted)?;
        let mut terminated_normally = false;
        let mut generated = 0usize;
        while generated < budget {
            if self.eos_ids.contains(&next) {
                terminated_normally = true;
                break;
            }
            history.push(next);
            generated += 1;
            if let Some(text) = detok.next_token(next)? {
                transcript.push(&text);
            }
            if generated == budget { break; }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Error::GenerationAborted(format!("generation timed out after {} tokens", generated)));
            }
            let logits = self.next_logits(&mut model, &[next], prompt_tokens.len() + generated - 1, &history)?;
            next = sampler.sample(&logits).map_err(aborted)?;
        }
        if let Some(rest) = detok.decode_rest()? {
            transcript.push(&rest);
        }

        let elapsed = started.elapsed();
        tracing::debug!(
            prompt_tokens = prompt_tokens.len(),
            generated,
            waited_ms,
            tokens_per_s = generated as f64 / elapsed.as_secs_f64().max(1e-3),
            terminated_normally,
            "llama generation finished"
        );
        Ok(transcript.finish(terminated_normally))
    }
}
