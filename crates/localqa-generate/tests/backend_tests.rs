use std::io::Write;

use localqa_core::config::PipelineConfig;
use localqa_core::Error;
use localqa_generate::{build_engine, BackendKind, LlamaCppEngine};

#[test]
fn backend_kind_parsing_ignores_case_and_punctuation() {
    for s in ["LlamaCpp", "llamacpp", "llama-cpp", "LLAMA_CPP", "gguf"] {
        assert_eq!(s.parse::<BackendKind>().expect(s), BackendKind::LlamaCpp, "{s}");
    }
    for s in ["GPT4All", "gpt4all", "gpt-4-all"] {
        assert_eq!(s.parse::<BackendKind>().expect(s), BackendKind::Gpt4All, "{s}");
    }
    assert_eq!("Ollama".parse::<BackendKind>().expect("ollama"), BackendKind::Ollama);
    assert_eq!(BackendKind::Ollama.to_string(), "Ollama");
    assert_eq!(BackendKind::Gpt4All.to_string(), "GPT4All");
}

#[test]
fn unknown_backend_is_rejected_by_name() {
    let err = "MosaicML".parse::<BackendKind>().expect_err("not supported");
    assert!(matches!(err, Error::UnsupportedBackend(ref name) if name == "MosaicML"), "got {err:?}");
    assert!(err.is_startup());
}

#[tokio::test]
async fn gpt4all_is_built_from_its_own_gguf_path() {
    let config = PipelineConfig {
        model_type: "GPT4All".to_string(),
        model_path: "/definitely/not/ggml-gpt4all-j-v1.3-groovy.gguf".to_string(),
        model_n_ctx: 2048,
        ..PipelineConfig::default()
    };
    match build_engine(&config).await {
        Ok(_) => panic!("missing GPT4All weights must not build"),
        Err(e) => {
            assert!(matches!(e, Error::ModelLoad(_)), "GPT4All is a known backend, got {e:?}");
            assert!(e.to_string().contains("ggml-gpt4all-j-v1.3-groovy.gguf"), "got {e}");
        }
    }
}

#[test]
fn gpt4all_corrupt_gguf_is_a_model_load_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("gpt4all.gguf");
    std::fs::write(&model, b"GGUF truncated header")?;
    std::fs::write(dir.path().join("tokenizer.json"), detok_fixture::TOKENIZER_JSON)?;
    let config = PipelineConfig {
        model_type: "GPT4All".to_string(),
        model_path: model.to_string_lossy().to_string(),
        ..PipelineConfig::default()
    };
    match LlamaCppEngine::load_as(&config, BackendKind::Gpt4All) {
        Ok(_) => panic!("corrupt model must fail"),
        Err(e) => assert!(matches!(e, Error::ModelLoad(_)), "got {e:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn factory_fails_before_loading_anything_for_unknown_kind() {
    let config = PipelineConfig {
        model_type: "OpenAI".to_string(),
        model_path: "/definitely/not/here.gguf".to_string(),
        ..PipelineConfig::default()
    };
    match build_engine(&config).await {
        Ok(_) => panic!("unknown backend must not build"),
        Err(e) => assert!(matches!(e, Error::UnsupportedBackend(_)), "got {e:?}"),
    }
}

#[test]
fn missing_gguf_is_a_model_load_error() {
    let config = PipelineConfig { model_path: "/definitely/not/here.gguf".to_string(), ..PipelineConfig::default() };
    match LlamaCppEngine::load(&config) {
        Ok(_) => panic!("missing model must fail"),
        Err(e) => {
            assert!(matches!(e, Error::ModelLoad(_)), "got {e:?}");
            assert!(e.to_string().contains("here.gguf"));
        }
    }
}

#[test]
fn missing_tokenizer_is_a_model_load_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("model.gguf");
    std::fs::write(&model, b"not really gguf")?;
    let config = PipelineConfig { model_path: model.to_string_lossy().to_string(), ..PipelineConfig::default() };
    match LlamaCppEngine::load(&config) {
        Ok(_) => panic!("missing tokenizer must fail"),
        Err(e) => assert!(e.to_string().contains("tokenizer"), "got {e}"),
    }
    Ok(())
}

#[test]
fn corrupt_gguf_is_a_model_load_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("model.gguf");
    let mut f = std::fs::File::create(&model)?;
    f.write_all(b"GGUF but then nothing sensible")?;
    std::fs::write(dir.path().join("tokenizer.json"), detok_fixture::TOKENIZER_JSON)?;
    let config = PipelineConfig { model_path: model.to_string_lossy().to_string(), ..PipelineConfig::default() };
    match LlamaCppEngine::load(&config) {
        Ok(_) => panic!("corrupt model must fail"),
        Err(e) => assert!(matches!(e, Error::ModelLoad(_)), "got {e:?}"),
    }
    Ok(())
}

mod detok_fixture {
    pub const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {"type": "WordLevel", "vocab": {"[UNK]": 0, "X": 1, "is": 2, "a": 3, "letter": 4}, "unk_token": "[UNK]"}
    }"#;
}
