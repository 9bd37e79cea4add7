use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use veriface_core::{EuclideanMatcher, OnnxFaceEmbedder};
use veriface_net::ImageFetcher;

mod config;
mod engine;
mod http;
mod verifier;

#[cfg(test)]
mod testing;

use config::Config;
use http::AppState;
use verifier::Verifier;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("verifaced starting");

    let config = Config::load()?;
    tracing::info!(
        bind = %config.bind,
        model_dir = %config.model_dir.display(),
        tolerance = config.tolerance,
        workers = config.engine_workers,
        "configuration loaded"
    );

    if config.tolerance_stricter_than(OnnxFaceEmbedder::RECOMMENDED_TOLERANCE) {
        tracing::warn!(
            tolerance = config.tolerance,
            recommended = OnnxFaceEmbedder::RECOMMENDED_TOLERANCE,
            "tolerance is stricter than the ArcFace calibration; different photos of one person will rarely match"
        );
    }

    let engine = engine::spawn_engine(config.engine_workers, || {
        OnnxFaceEmbedder::load(&config.model_dir)
    })
    .context("failed to start face engine")?;

    let fetcher = ImageFetcher::new(config.fetch_policy())?;
    let verifier = Verifier::new(
        fetcher,
        engine,
        EuclideanMatcher::new(config.tolerance),
        config.request_deadline(),
    );

    let app = http::router(AppState {
        verifier: Arc::new(verifier),
        expose_error_details: config.expose_error_details,
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "verifaced ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("verifaced shutting down");
        })
        .await?;

    Ok(())
}
