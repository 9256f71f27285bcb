//! Detection model seam.
//!
//! The processor only needs "image in, (class, confidence, box) triples out".
//! [`Detector`] is that contract; [`crate::yolo::YoloDetector`] is the ONNX
//! implementation used in production.

use framewire_models::{BoundingBox, Detection};

use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;

/// A detection as reported by the model, in pixel coordinates of the input frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_name: String,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl RawDetection {
    pub fn new(class_name: impl Into<String>, confidence: f32, xyxy: [f32; 4]) -> Self {
        let [x1, y1, x2, y2] = xyxy;
        Self {
            class_name: class_name.into(),
            confidence,
            x1,
            y1,
            x2,
            y2,
        }
    }
}

/// An object detection model.
///
/// Implementations are shared across connections and may be called
/// concurrently; any internal mutable state must be synchronized.
#[cfg_attr(test, mockall::automock)]
pub trait Detector: Send + Sync {
    /// Run the model once on a frame.
    fn detect(&self, frame: &Frame) -> VisionResult<Vec<RawDetection>>;

    /// Class labels the model can emit.
    fn class_names(&self) -> Vec<String>;

    /// Short human-readable model description for logs and readiness checks.
    fn describe(&self) -> String {
        "detector".to_string()
    }
}

/// Convert a model detection into an integer box inside a `width` x `height` frame.
///
/// Coordinates are clamped to the frame and truncated. Boxes that collapse to
/// zero width or height are widened to one pixel, so every model detection
/// yields exactly one valid [`Detection`].
pub fn normalize_detection(raw: &RawDetection, width: u32, height: u32) -> VisionResult<Detection> {
    let (x1, x2) = pixel_span(raw.x1, raw.x2, width);
    let (y1, y2) = pixel_span(raw.y1, raw.y2, height);

    let bbox = BoundingBox::new(x1, y1, x2, y2)
        .map_err(|e| VisionError::unexpected(e.to_string()))?;

    Ok(Detection::new(raw.class_name.clone(), raw.confidence, bbox))
}

fn pixel_span(a: f32, b: f32, limit: u32) -> (u32, u32) {
    let limit = limit.max(1);
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

    // `as` saturates: negatives and NaN become 0, overflow becomes u32::MAX.
    let lo = (lo as u32).min(limit);
    let hi = (hi as u32).min(limit);

    if hi > lo {
        (lo, hi)
    } else if lo < limit {
        (lo, lo + 1)
    } else {
        (limit - 1, limit)
    }
}
