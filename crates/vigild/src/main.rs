use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vigil_core::{LandmarkFile, OnnxLandmarkExtractor, UserDirectory, Verifier};

mod config;
mod engine;
mod error;
mod routes;

use config::Config;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    tracing::info!(?config, "vigild starting");

    let mut directory = UserDirectory::load_or_embedded(config.users_path.as_deref())
        .context("failed to load user dataset")?;

    // The service is useless without reference landmarks: fail fast.
    let landmarks = LandmarkFile::load(&config.landmarks_path)
        .with_context(|| format!("failed to load {}", config.landmarks_path.display()))?;
    let attached = directory.attach_landmarks(&landmarks);
    tracing::info!(
        users = directory.len(),
        with_landmarks = attached,
        path = %config.landmarks_path.display(),
        "user directory loaded"
    );
    for user in directory.users().iter().filter(|u| u.landmarks.is_none()) {
        tracing::warn!(user_id = %user.id, "no stored landmarks; verification will fail for this user");
    }

    let extractor = OnnxLandmarkExtractor::load(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    let engine = engine::spawn_engine(extractor)?;

    let state = AppState {
        engine,
        verifier: Arc::new(Verifier::new(directory, config.similarity_threshold)),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, threshold = config.similarity_threshold, "vigild ready");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("vigild shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}
