mod api_error;
mod generate_form;
mod handlers;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use quiz_engine::{QuizConfig, QuizPipeline};
use std::sync::OnceLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

static QUIZ_PIPELINE: OnceLock<QuizPipeline> = OnceLock::new();

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = QuizConfig::from_env().context("invalid quiz configuration")?;
    let pipeline = QuizPipeline::from_config(config).context("failed to initialize quiz pipeline")?;
    QUIZ_PIPELINE
        .set(pipeline)
        .map_err(|_| anyhow::anyhow!("quiz pipeline initialized twice"))?;
    log::info!("Quiz pipeline initialized successfully");

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/generate", post(handlers::generate))
        .route("/generate/archive", post(handlers::generate_archive))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        );

    let addr = std::env::var("QUIZ_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
