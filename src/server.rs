//! HTTP surface of the inference service

use crate::metrics::{InferenceMetrics, MetricsSnapshot};
use crate::models::inference::InferenceEngine;
use crate::types::prediction::PredictionResult;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Absent when artifacts failed to load at startup
    pub engine: Option<Arc<InferenceEngine>>,
    pub metrics: Arc<InferenceMetrics>,
}

impl AppState {
    pub fn new(engine: Option<InferenceEngine>) -> Self {
        Self {
            engine: engine.map(Arc::new),
            metrics: Arc::new(InferenceMetrics::new()),
        }
    }

    fn engine(&self) -> Result<Arc<InferenceEngine>, ServerError> {
        self.engine.clone().ok_or(ServerError::ModelNotLoaded)
    }
}

/// Errors answered before any record is classified
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Model not loaded. Please train the model first.")]
    ModelNotLoaded,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match self {
            ServerError::ModelNotLoaded | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(json!({
            "status": "error",
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Create the service router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_body(body: &Bytes) -> Result<Value, ServerError> {
    if body.is_empty() {
        return Err(ServerError::InvalidRequest("No data provided".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| ServerError::InvalidRequest(format!("Invalid JSON: {}", e)))
}

/// Run forest prediction on the blocking pool so request tasks keep moving
async fn classify<T, F>(f: F) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(format!("Prediction task failed: {}", e)))
}

async fn index(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "Patient Report Classification Service",
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": state.engine.is_some(),
        "endpoints": {
            "/health": "GET - health check",
            "/predict": "POST - classify one report",
            "/predict/batch": "POST - classify {\"reports\": [...]}",
            "/metrics": "GET - serving statistics",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.engine.is_some(),
    }))
}

async fn predict(State(state): State<AppState>, body: Bytes) -> Result<Response, ServerError> {
    let engine = state.engine()?;
    let value = parse_body(&body)?;
    if !value.is_object() {
        return Err(ServerError::InvalidRequest("Report must be a JSON object".to_string()));
    }

    let start = Instant::now();
    let result = classify(move || engine.predict_json(&value)).await?;
    state.metrics.record_request(start.elapsed(), std::slice::from_ref(&result));

    let status = match result.failure() {
        None => StatusCode::OK,
        Some(failure) => {
            debug!(error = %failure.error, "Prediction failed");
            StatusCode::BAD_REQUEST
        }
    };
    Ok((status, Json(result)).into_response())
}

/// Response of the batch route
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub status: &'static str,
    pub results: Vec<PredictionResult>,
}

async fn predict_batch(State(state): State<AppState>, body: Bytes) -> Result<Json<BatchResponse>, ServerError> {
    let engine = state.engine()?;
    let mut value = parse_body(&body)?;
    let reports = match value.get_mut("reports").map(Value::take) {
        Some(Value::Array(reports)) => reports,
        _ => return Err(ServerError::InvalidRequest("No reports provided".to_string())),
    };

    let start = Instant::now();
    let results: Vec<PredictionResult> = classify(move || engine.predict_json_batch(&reports)).await?;
    state.metrics.record_request(start.elapsed(), &results);

    debug!(
        reports = results.len(),
        failed = results.iter().filter(|r| !r.is_success()).count(),
        "Batch classified"
    );
    Ok(Json(BatchResponse {
        status: "success",
        results,
    }))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
