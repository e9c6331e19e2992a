use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use localqa_core::config::Config;
use localqa_http::{build_router, AppState};
use localqa_pipeline::AnswerPipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        // stdout carries the streamed answers
        .with_writer(std::io::stderr)
        .init();

    let app = Config::load()?.app().context("invalid configuration")?;
    let pipeline = AnswerPipeline::from_config(&app.pipeline)
        .await
        .context("failed to build the answer pipeline")?;
    let state = AppState::new(Arc::new(pipeline), app.pipeline.include_sources);

    let addr = format!("{}:{}", app.server.host, app.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!(%addr, backend = %app.pipeline.model_type, "localqa-server listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
