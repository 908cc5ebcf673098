//! Patient Report Pipeline - Main Entry Point
//!
//! Loads the trained artifacts and serves predictions over HTTP.

use anyhow::{Context, Result};
use patient_report_pipeline::{
    config::AppConfig,
    metrics::MetricsReporter,
    models::inference::InferenceEngine,
    server::{create_router, AppState},
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    config.logging.init()?;

    info!("Starting Patient Report Classification Service");

    // Serve without a model rather than refusing to start
    let engine = match InferenceEngine::load(&config.artifacts.models_dir) {
        Ok(engine) => {
            info!(
                features = engine.feature_names().len(),
                classes = ?engine.class_labels(),
                "Model loaded successfully"
            );
            Some(engine)
        }
        Err(e) => {
            warn!(
                models_dir = %config.artifacts.models_dir,
                error = %e,
                "Failed to load model, prediction routes will answer 500"
            );
            None
        }
    };

    let state = AppState::new(engine);
    let metrics = state.metrics.clone();

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
