mod common;

use std::sync::Arc;

use localqa_core::config::PipelineConfig;
use localqa_core::traits::estimate_tokens;
use localqa_core::Error;
use localqa_pipeline::prompt::render;
use localqa_pipeline::{AnswerOptions, AnswerPipeline};

use common::{config_with_top_k, pipeline, reference_index, ScriptedEngine};

const ANSWER: &[&str] = &["X", " is", " a", " letter", "."];

#[test]
fn answers_with_citations_for_used_passages() {
    let engine = Arc::new(ScriptedEngine::new(ANSWER));
    let config = config_with_top_k(2);
    let qa = pipeline(engine.clone(), &config);

    let answer = qa.answer("What is X?", AnswerOptions::from_config(&config), None).expect("answer");
    assert_eq!(answer.query, "What is X?");
    assert_eq!(answer.result, "X is a letter.");
    let sources: Vec<&str> = answer.citations.iter().map(|c| c.source.as_str()).collect();
    assert_eq!(sources, vec!["doc1.txt", "doc2.txt"]);
    assert_eq!(answer.stats.retrieved, 2);
    assert_eq!(answer.stats.used, 2);
    assert!(answer.stats.terminated_normally);

    let prompt = engine.last_prompt();
    assert!(prompt.contains("X is the twenty-fourth letter"));
    assert!(prompt.contains("X comes after W"));
    assert!(!prompt.contains("Boats"), "third passage is beyond top_k");
    assert!(prompt.ends_with("Question: What is X?\nHelpful Answer:"));
}

#[test]
fn hidden_sources_leave_citations_empty() {
    let engine = Arc::new(ScriptedEngine::new(ANSWER));
    let config = config_with_top_k(2);
    let qa = pipeline(engine, &config);
    let options = AnswerOptions { include_sources: false, mute_stream: false };
    let answer = qa.answer("What is X?", options, None).expect("answer");
    assert!(answer.citations.is_empty());
    assert_eq!(answer.stats.used, 2, "passages are still used for the prompt");
}

#[test]
fn streamed_chunks_equal_the_answer() {
    let engine = Arc::new(ScriptedEngine::new(ANSWER));
    let config = config_with_top_k(2);
    let qa = pipeline(engine, &config);

    let mut streamed = Vec::new();
    let mut sink = |chunk: &str| streamed.push(chunk.to_string());
    let answer = qa.answer("What is X?", AnswerOptions::from_config(&config), Some(&mut sink)).expect("answer");
    assert_eq!(streamed.len(), ANSWER.len());
    assert_eq!(streamed.concat(), answer.result);
}

#[test]
fn muted_or_disabled_streaming_never_calls_the_sink() {
    let engine = Arc::new(ScriptedEngine::new(ANSWER));
    let mut calls = 0usize;

    let config = config_with_top_k(2);
    let qa = pipeline(engine.clone(), &config);
    let muted = AnswerOptions { include_sources: true, mute_stream: true };
    let answer = qa.answer("What is X?", muted, Some(&mut |_: &str| calls += 1)).expect("answer");
    assert_eq!(answer.result, "X is a letter.");

    let quiet = PipelineConfig { stream_tokens: false, ..config_with_top_k(2) };
    let qa = pipeline(engine, &quiet);
    qa.answer("What is X?", AnswerOptions::from_config(&quiet), Some(&mut |_: &str| calls += 1)).expect("answer");
    assert_eq!(calls, 0);
}

#[test]
fn empty_query_is_answered() {
    let engine = Arc::new(ScriptedEngine::new(&["I don't know."]));
    let config = config_with_top_k(4);
    let qa = pipeline(engine.clone(), &config);
    let answer = qa.answer("", AnswerOptions::from_config(&config), None).expect("empty query");
    assert_eq!(answer.result, "I don't know.");
    assert_eq!(answer.citations.len(), 3, "index holds only three passages");
    assert!(engine.last_prompt().contains("Question: \nHelpful Answer:"));
}

#[test]
fn overflowing_passages_are_dropped_lowest_rank_first_and_not_cited() {
    let index = reference_index();
    let first = localqa_core::types::RankedPassage { passage: index.hits[0].0.clone(), rank: 0, score: 0.92 };
    let budget = estimate_tokens(&render("What is X?", &[first]));
    let engine = Arc::new(ScriptedEngine { context_window: budget + 256, max_tokens: 256, ..ScriptedEngine::new(ANSWER) });
    let config = config_with_top_k(3);
    let qa = pipeline(engine.clone(), &config);

    let answer = qa.answer("What is X?", AnswerOptions::from_config(&config), None).expect("answer");
    assert_eq!(answer.stats.retrieved, 3);
    assert_eq!(answer.stats.used, 1);
    assert_eq!(answer.stats.dropped, 2);
    assert_eq!(answer.citations.iter().map(|c| c.source.as_str()).collect::<Vec<_>>(), vec!["doc1.txt"]);
    assert!(!engine.last_prompt().contains("X comes after W"));
}

#[test]
fn aborted_generation_fails_the_request() {
    let engine = Arc::new(ScriptedEngine { fail_with: Some("runtime crashed".into()), ..ScriptedEngine::new(ANSWER) });
    let config = config_with_top_k(2);
    let qa = pipeline(engine, &config);
    let mut streamed = String::new();
    let err = qa
        .answer("What is X?", AnswerOptions::from_config(&config), Some(&mut |c: &str| streamed.push_str(c)))
        .expect_err("engine failure propagates");
    assert!(matches!(err, Error::GenerationAborted(_)), "got {err:?}");
    assert_eq!(streamed, "X", "chunks before the failure were already streamed");
}

#[test]
fn citations_carry_passage_metadata() {
    let engine = Arc::new(ScriptedEngine::new(ANSWER));
    let config = config_with_top_k(1);
    let qa = pipeline(engine, &config);
    let answer = qa.answer("What is X?", AnswerOptions::from_config(&config), None).expect("answer");
    assert_eq!(answer.citations.len(), 1);
    let c = &answer.citations[0];
    assert_eq!(c.metadata.get("source").map(String::as_str), Some("doc1.txt"));
    assert_eq!(c.text, "X is the twenty-fourth letter of the alphabet.");
}

#[tokio::test]
async fn unsupported_backend_fails_before_loading_the_index() {
    let config = PipelineConfig {
        model_type: "HuggingFaceHub".to_string(),
        persist_directory: "/definitely/not/a/db".to_string(),
        ..config_with_top_k(2)
    };
    match AnswerPipeline::from_config(&config).await {
        Ok(_) => panic!("HuggingFaceHub is not a supported backend"),
        Err(e) => assert!(matches!(e, Error::UnsupportedBackend(_)), "got {e:?}"),
    }
}

#[tokio::test]
async fn gpt4all_backend_is_accepted_and_proceeds_to_the_index() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = PipelineConfig {
        model_type: "GPT4All".to_string(),
        persist_directory: tmp.path().to_string_lossy().to_string(),
        model_path: "/definitely/not/ggml-gpt4all.gguf".to_string(),
        ..config_with_top_k(2)
    };
    match AnswerPipeline::from_config(&config).await {
        Ok(_) => panic!("no documents table exists"),
        Err(e) => assert!(matches!(e, Error::IndexUnavailable(_)), "got {e:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn missing_index_fails_before_loading_the_model() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = PipelineConfig {
        persist_directory: tmp.path().to_string_lossy().to_string(),
        model_path: "/definitely/not/here.gguf".to_string(),
        ..config_with_top_k(2)
    };
    match AnswerPipeline::from_config(&config).await {
        Ok(_) => panic!("no documents table exists"),
        Err(e) => assert!(matches!(e, Error::IndexUnavailable(_)), "got {e:?}"),
    }
    Ok(())
}
