use anyhow::{Context, Result};
use frontal_core::{FacePipeline, OnnxLandmarkExtractor, ScrfdLocator};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("frontald starting");

    let config = config::Config::load().context("loading configuration")?;
    tracing::info!(
        bind = %config.bind,
        model_dir = %config.model_dir.display(),
        area_ratio = config.thresholds.area_ratio,
        slope = config.thresholds.slope,
        contour = ?config.thresholds.contour,
        "configuration loaded"
    );

    // Models load once here and move into the engine thread.
    let locator = ScrfdLocator::load(&config.detector_model_path(), config.locator)
        .context("loading face detector")?;
    let extractor = OnnxLandmarkExtractor::load(&config.landmark_model_path(), config.extractor)
        .context("loading landmark model")?;
    let pipeline = FacePipeline::new(Box::new(locator), Box::new(extractor), config.thresholds)
        .with_max_faces(config.max_faces);

    let engine = engine::spawn_engine(pipeline, config.queue_depth)?;
    let app = http::router(
        http::AppState::new(engine, config.thresholds),
        config.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "frontald ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("frontald shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
    }
}
