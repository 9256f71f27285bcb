//! Axum WebSocket relay for per-frame object detection.
//!
//! This crate provides:
//! - The `/ws` event socket (`frame` in, `bboxes` / `error` out)
//! - Health and readiness probes
//! - Prometheus metrics

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use routes::create_router;
pub use state::AppState;
