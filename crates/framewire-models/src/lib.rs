//! Shared data models for the Framewire relay.
//!
//! This crate provides Serde-serializable types for:
//! - Detections and their bounding boxes
//! - Per-frame detection batches
//! - WebSocket event schemas

pub mod detection;
pub mod ws;

// Re-export common types
pub use detection::{BoundingBox, BoundingBoxError, Detection, DetectionBatch};
pub use ws::{BboxesPayload, ClientEvent, ErrorPayload, EventParseError, FramePayload, ServerEvent};
