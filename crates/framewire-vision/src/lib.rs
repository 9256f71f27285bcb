//! Frame processing for the Framewire relay.
//!
//! This crate provides:
//! - Decoding of encoded (and base64) frames
//! - The [`Detector`] seam and a YOLOv8 ONNX implementation
//! - The per-frame [`FrameProcessor`] pipeline
//! - An optional debug overlay written to disk

pub mod annotate;
pub mod config;
pub mod detector;
pub mod error;
pub mod frame;
pub mod processor;
pub mod yolo;

pub use annotate::Annotator;
pub use config::{DetectorConfig, VisionConfig};
pub use detector::{normalize_detection, Detector, RawDetection};
pub use error::{VisionError, VisionResult};
pub use frame::{decode_base64, decode_frame, Frame};
pub use processor::FrameProcessor;
pub use yolo::{YoloDetector, COCO_CLASSES};
