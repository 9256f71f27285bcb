//! Shared fixtures for API tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};

use framewire_api::{ApiConfig, AppState};
use framewire_vision::{Detector, Frame, FrameProcessor, RawDetection, VisionError, VisionResult};

/// Returns the same detections for every frame and counts calls.
pub struct FixedDetector {
    detections: Vec<RawDetection>,
    calls: AtomicUsize,
}

impl FixedDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            detections,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for FixedDetector {
    fn detect(&self, _frame: &Frame) -> VisionResult<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }

    fn class_names(&self) -> Vec<String> {
        vec!["card".to_string()]
    }

    fn describe(&self) -> String {
        "fixed".to_string()
    }
}

/// Always fails inference.
pub struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(&self, _frame: &Frame) -> VisionResult<Vec<RawDetection>> {
        Err(VisionError::model("session exploded"))
    }

    fn class_names(&self) -> Vec<String> {
        Vec::new()
    }
}

pub fn state_with(detector: Arc<dyn Detector>) -> AppState {
    AppState::new(ApiConfig::default(), FrameProcessor::new(detector))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

pub fn frame_event(width: u32, height: u32) -> String {
    let image = STANDARD.encode(png_bytes(width, height));
    serde_json::json!({ "event": "frame", "data": { "image": image } }).to_string()
}
