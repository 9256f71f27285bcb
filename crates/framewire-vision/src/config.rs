//! Detector and frame processor configuration.

use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::error::{VisionError, VisionResult};

/// Configuration for the YOLOv8 detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Optional labels file, one class name per line (COCO names when unset)
    pub labels_path: Option<PathBuf>,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
    /// Upper bound on detections returned per frame
    pub max_detections: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolov8n.onnx"),
            labels_path: None,
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
            max_detections: 300,
        }
    }
}

impl DetectorConfig {
    /// Check thresholds and sizes, and that the model file exists.
    pub fn validate(&self) -> VisionResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(VisionError::invalid_config(format!(
                "confidence threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            return Err(VisionError::invalid_config(format!(
                "NMS threshold must be in [0, 1], got {}",
                self.nms_threshold
            )));
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(VisionError::invalid_config(format!(
                "model input size must be a positive multiple of 32, got {}",
                self.input_size
            )));
        }
        if self.max_detections == 0 {
            return Err(VisionError::invalid_config("max detections must be at least 1"));
        }
        if !self.model_path.is_file() {
            return Err(VisionError::ModelNotFound(self.model_path.clone()));
        }
        if let Some(labels) = &self.labels_path {
            if !labels.is_file() {
                return Err(VisionError::invalid_config(format!(
                    "labels file not found: {}",
                    labels.display()
                )));
            }
        }
        Ok(())
    }
}

/// Frame processor configuration.
#[derive(Debug, Clone, Default)]
pub struct VisionConfig {
    pub detector: DetectorConfig,
    /// Where to write the annotated copy of the last frame (disabled when unset)
    pub debug_image_path: Option<PathBuf>,
    /// TTF/OTF font for overlay labels (boxes only when unset)
    pub debug_font_path: Option<PathBuf>,
}

impl VisionConfig {
    /// Create config from environment variables.
    ///
    /// `MODEL_PATH` is required; everything else has a default.
    pub fn from_env() -> VisionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> VisionResult<Self> {
        let defaults = DetectorConfig::default();

        let model_path = lookup("MODEL_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| VisionError::invalid_config("MODEL_PATH is not set"))?;

        let detector = DetectorConfig {
            model_path,
            labels_path: non_empty(&lookup, "MODEL_LABELS_PATH").map(PathBuf::from),
            confidence_threshold: parse_or(&lookup, "CONFIDENCE_THRESHOLD", defaults.confidence_threshold)?,
            nms_threshold: parse_or(&lookup, "NMS_THRESHOLD", defaults.nms_threshold)?,
            input_size: parse_or(&lookup, "MODEL_INPUT_SIZE", defaults.input_size)?,
            max_detections: parse_or(&lookup, "MAX_DETECTIONS", defaults.max_detections)?,
        };

        Ok(Self {
            detector,
            debug_image_path: non_empty(&lookup, "DEBUG_IMAGE_PATH").map(PathBuf::from),
            debug_font_path: non_empty(&lookup, "DEBUG_FONT_PATH").map(PathBuf::from),
        })
    }

    /// Validate the configuration before the model is loaded.
    pub fn validate(&self) -> VisionResult<()> {
        self.detector.validate()?;

        if let Some(font) = &self.debug_font_path {
            if !font.is_file() {
                return Err(VisionError::invalid_config(format!(
                    "debug font not found: {}",
                    font.display()
                )));
            }
        }
        if let Some(path) = &self.debug_image_path {
            if ImageFormat::from_path(path).is_err() {
                return Err(VisionError::invalid_config(format!(
                    "debug image path has no supported image extension: {}",
                    path.display()
                )));
            }
        }
        if let Some(parent) = self.debug_image_path.as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(VisionError::invalid_config(format!(
                    "debug image directory does not exist: {}",
                    parent.display()
                )));
            }
        }
        Ok(())
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|s| !s.trim().is_empty())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> VisionResult<T>
where
    T: std::str::FromStr,
{
    match non_empty(lookup, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| VisionError::invalid_config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
