//! Detection types produced for each frame.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error for a box whose corners are not strictly ordered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid bounding box [{x1}, {y1}, {x2}, {y2}]: expected x1 < x2 and y1 < y2")]
pub struct BoundingBoxError {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

/// Axis-aligned box in integer pixel coordinates.
///
/// Serialized as `[x1, y1, x2, y2]`. Construction guarantees `x1 < x2` and
/// `y1 < y2`, so a deserialized box is always valid too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 4]", into = "[u32; 4]")]
pub struct BoundingBox {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

impl BoundingBox {
    /// Create a bounding box from its top-left and bottom-right corners.
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self, BoundingBoxError> {
        if x1 >= x2 || y1 >= y2 {
            return Err(BoundingBoxError { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn x1(&self) -> u32 {
        self.x1
    }

    pub fn y1(&self) -> u32 {
        self.y1
    }

    pub fn x2(&self) -> u32 {
        self.x2
    }

    pub fn y2(&self) -> u32 {
        self.y2
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Corners as `[x1, y1, x2, y2]`.
    pub fn to_array(&self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl TryFrom<[u32; 4]> for BoundingBox {
    type Error = BoundingBoxError;

    fn try_from([x1, y1, x2, y2]: [u32; 4]) -> Result<Self, Self::Error> {
        Self::new(x1, y1, x2, y2)
    }
}

impl From<BoundingBox> for [u32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

/// A single detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Class label reported by the model
    #[serde(rename = "class")]
    pub class_name: String,
    /// Model confidence in [0, 1]
    pub confidence: f32,
    /// Box in pixel coordinates of the submitted frame
    #[schemars(with = "[u32; 4]")]
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }

    /// Overlay label, e.g. `card 0.91`.
    pub fn label(&self) -> String {
        format!("{} {:.2}", self.class_name, self.confidence)
    }
}

/// Detections for one frame, in the order the model produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct DetectionBatch(Vec<Detection>);

impl DetectionBatch {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self(detections)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Detection> {
        self.0
    }
}

impl From<Vec<Detection>> for DetectionBatch {
    fn from(detections: Vec<Detection>) -> Self {
        Self(detections)
    }
}

impl FromIterator<Detection> for DetectionBatch {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DetectionBatch {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
