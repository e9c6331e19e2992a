use std::env;
use std::io::Write;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use localqa_core::config::Config;
use localqa_pipeline::{AnswerOptions, AnswerPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let mut query: Option<String> = None;
    let mut hide_source = false;
    let mut mute_stream = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "--hide-source" | "-S" => hide_source = true,
            "--mute-stream" | "-M" => mute_stream = true,
            s if !s.starts_with('-') && query.is_none() => query = Some(s.to_string()),
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(2);
            }
        }
    }
    let Some(query) = query else {
        eprintln!("Usage: {} \"<query>\" [--hide-source] [--mute-stream]", args[0]);
        std::process::exit(1);
    };

    let app = Config::load()?.app().context("invalid configuration")?;
    let pipeline = AnswerPipeline::from_config(&app.pipeline).await?;
    let mut options = AnswerOptions::from_config(&app.pipeline);
    options.include_sources &= !hide_source;
    options.mute_stream = mute_stream;

    println!("\n> Question:\n{query}\n\n> Answer:");
    let answer = tokio::task::spawn_blocking(move || {
        let mut stdout = std::io::stdout();
        let mut echo = |chunk: &str| {
            let _ = stdout.write_all(chunk.as_bytes());
            let _ = stdout.flush();
        };
        pipeline.answer(&query, options, Some(&mut echo))
    })
    .await??;

    if mute_stream || !app.pipeline.stream_tokens {
        println!("{}", answer.result);
    } else {
        println!();
    }
    for citation in &answer.citations {
        println!("\n> {}:\n{}", citation.source, citation.text);
    }
    tracing::debug!(stats = ?answer.stats, "done");
    Ok(())
}
