//! Health check handlers.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub model: String,
    pub classes: usize,
}

/// Readiness check endpoint (readiness probe).
///
/// The model is loaded before the server binds, so a running server is ready.
pub async fn ready(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let detector = state.processor.detector();
    Json(ReadinessResponse {
        status: "ready".to_string(),
        model: detector.describe(),
        classes: detector.class_names().len(),
    })
}
