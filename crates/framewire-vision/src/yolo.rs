//! Object detection using a YOLOv8 ONNX model.
//!
//! Uses ONNX Runtime with automatic execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS with Apple Silicon
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::Mutex;

use image::imageops::FilterType;
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::detector::{Detector, RawDetection};
use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;

/// COCO class names (80 classes), used when no labels file is configured.
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Candidate box in original image pixels, before NMS.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    class_id: usize,
    confidence: f32,
}

/// Object detector using a YOLOv8 ONNX model.
///
/// The session is behind a mutex: ONNX Runtime needs `&mut Session` to run,
/// so concurrent frames are serialized here.
pub struct YoloDetector {
    session: Mutex<Session>,
    class_names: Vec<String>,
    config: DetectorConfig,
}

impl YoloDetector {
    /// Load the model described by `config`.
    ///
    /// Returns error if the model file doesn't exist or cannot be loaded.
    pub fn new(config: DetectorConfig) -> VisionResult<Self> {
        if !config.model_path.is_file() {
            return Err(VisionError::ModelNotFound(config.model_path.clone()));
        }

        let class_names = match &config.labels_path {
            Some(path) => load_labels(path)?,
            None => COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        };

        let session = Mutex::new(create_session(&config.model_path)?);
        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            classes = class_names.len(),
            "Object detector initialized"
        );

        Ok(Self {
            session,
            class_names,
            config,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Preprocess a frame for YOLOv8 inference.
    ///
    /// - Resize to model input size
    /// - Normalize pixel values to [0, 1]
    /// - Convert to NCHW format (batch, channels, height, width)
    fn preprocess(&self, frame: &Frame) -> VisionResult<Value> {
        let input_size = self.config.input_size;
        let resized = image::imageops::resize(frame.image(), input_size, input_size, FilterType::Triangle);
        let (w, h) = (input_size as usize, input_size as usize);

        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);

        // HWC -> CHW with normalization to [0, 1]
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let pixel = resized.get_pixel(x as u32, y as u32);
                    chw_data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| VisionError::model(format!("Failed to create tensor: {}", e)))
    }

    /// Run ONNX inference and return the `output0` dims with its flat data.
    fn run_inference(&self, input: Value) -> VisionResult<(Vec<usize>, Vec<f32>)> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| VisionError::unexpected("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| VisionError::model(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 4 + num_classes, num_candidates]
        let output = outputs
            .get("output0")
            .ok_or_else(|| VisionError::model("Missing output0 tensor"))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::model(format!("Failed to extract tensor: {}", e)))?;

        let dims = shape
            .iter()
            .map(|&d| {
                usize::try_from(d)
                    .map_err(|_| VisionError::model(format!("Invalid output dimension: {}", d)))
            })
            .collect::<VisionResult<Vec<usize>>>()?;

        Ok((dims, data.to_vec()))
    }
}

impl Detector for YoloDetector {
    fn detect(&self, frame: &Frame) -> VisionResult<Vec<RawDetection>> {
        let input = self.preprocess(frame)?;
        let (dims, outputs) = self.run_inference(input)?;

        let candidates = decode_output(
            &dims,
            &outputs,
            self.class_names.len(),
            self.config.input_size,
            self.config.confidence_threshold,
            (frame.width(), frame.height()),
        )?;
        let mut kept = non_maximum_suppression(candidates, self.config.nms_threshold);
        kept.truncate(self.config.max_detections);

        debug!(count = kept.len(), "Object detection completed");

        kept.into_iter()
            .map(|c| {
                let class_name = self
                    .class_names
                    .get(c.class_id)
                    .cloned()
                    .ok_or_else(|| VisionError::model(format!("Class id {} out of range", c.class_id)))?;
                Ok(RawDetection::new(class_name, c.confidence, [c.x1, c.y1, c.x2, c.y2]))
            })
            .collect()
    }

    fn class_names(&self) -> Vec<String> {
        self.class_names.clone()
    }

    fn describe(&self) -> String {
        format!("yolov8:{}", self.config.model_path.display())
    }
}

/// Parse a YOLOv8 output tensor into thresholded candidates.
///
/// Output format: `[1, 4 + num_classes, num_candidates]`, where the first four
/// rows are `cx, cy, w, h` in model input pixels and the rest are class scores.
/// A model whose class rows don't match the configured labels is rejected.
fn decode_output(
    dims: &[usize],
    outputs: &[f32],
    num_classes: usize,
    input_size: u32,
    confidence_threshold: f32,
    (orig_width, orig_height): (u32, u32),
) -> VisionResult<Vec<Candidate>> {
    let num_features = 4 + num_classes;
    let &[batch, features, num_boxes] = dims else {
        return Err(VisionError::model(format!(
            "Expected a 3-dimensional output tensor, got shape {:?}",
            dims
        )));
    };
    if batch != 1 {
        return Err(VisionError::model(format!("Expected batch size 1, got {}", batch)));
    }
    if num_classes == 0 || features != num_features {
        return Err(VisionError::model(format!(
            "Model outputs {} class scores but {} labels are configured",
            features.saturating_sub(4),
            num_classes
        )));
    }
    if outputs.len() != num_features * num_boxes {
        return Err(VisionError::model(format!(
            "Output has {} values, expected {} for shape {:?}",
            outputs.len(),
            num_features * num_boxes,
            dims
        )));
    }

    // Reshape [num_features, num_boxes] and transpose to [num_boxes, num_features]
    let output_array = Array::from_shape_vec((num_features, num_boxes), outputs.to_vec())
        .map_err(|e| VisionError::model(format!("Failed to reshape output: {}", e)))?;
    let transposed = output_array.t();

    let scale_w = orig_width as f32 / input_size as f32;
    let scale_h = orig_height as f32 / input_size as f32;

    let mut candidates = Vec::new();
    for i in 0..num_boxes {
        let cx = transposed[[i, 0]];
        let cy = transposed[[i, 1]];
        let w = transposed[[i, 2]];
        let h = transposed[[i, 3]];

        let mut best_class = 0;
        let mut best_score = 0.0f32;
        for c in 0..num_classes {
            let score = transposed[[i, 4 + c]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if best_score < confidence_threshold {
            continue;
        }

        // Center format -> corner format, scaled back to the original frame
        candidates.push(Candidate {
            x1: (cx - w / 2.0) * scale_w,
            y1: (cy - h / 2.0) * scale_h,
            x2: (cx + w / 2.0) * scale_w,
            y2: (cy + h / 2.0) * scale_h,
            class_id: best_class,
            confidence: best_score,
        });
    }

    Ok(candidates)
}

/// Apply class-wise Non-Maximum Suppression, highest confidence first.
fn non_maximum_suppression(mut detections: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }

        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].class_id != detections[j].class_id {
                continue;
            }
            if compute_iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection over Union of two candidates.
fn compute_iou(a: &Candidate, b: &Candidate) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Read class names, one per line; blank lines are skipped.
fn load_labels(path: &Path) -> VisionResult<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    let labels: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if labels.is_empty() {
        return Err(VisionError::invalid_config(format!(
            "labels file is empty: {}",
            path.display()
        )));
    }
    Ok(labels)
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> VisionResult<Session> {
    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| VisionError::model(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| VisionError::model(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!(model_path = %model_path.display(), "Using CUDA execution provider");
                return Ok(session);
            }
        }
        debug!(model_path = %model_path.display(), "CUDA execution provider unavailable, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!(model_path = %model_path.display(), "Using CoreML execution provider");
                return Ok(session);
            }
        }
        debug!(model_path = %model_path.display(), "CoreML execution provider unavailable, falling back to CPU");
    }

    info!(model_path = %model_path.display(), "Using CPU execution provider");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| VisionError::model(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn candidate(x1: f32, y1: f32, x2: f32, y2: f32, class_id: usize, confidence: f32) -> Candidate {
        Candidate {
            x1,
            y1,
            x2,
            y2,
            class_id,
            confidence,
        }
    }

    /// Build a flat [4 + classes, boxes] tensor from per-box rows.
    fn tensor(rows: &[[f32; 6]]) -> Vec<f32> {
        let num_features = 6;
        let mut out = vec![0.0; num_features * rows.len()];
        for (i, row) in rows.iter().enumerate() {
            for f in 0..num_features {
                out[f * rows.len() + i] = row[f];
            }
        }
        out
    }

    #[test]
    fn test_coco_classes() {
        assert_eq!(COCO_CLASSES[0], "person");
        assert_eq!(COCO_CLASSES[2], "car");
        assert_eq!(COCO_CLASSES.len(), 80);
    }

    #[test]
    fn test_iou() {
        let a = candidate(0.0, 0.0, 10.0, 10.0, 0, 0.9);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);

        let b = candidate(5.0, 0.0, 15.0, 10.0, 0, 0.8);
        assert!((compute_iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);

        let c = candidate(20.0, 20.0, 30.0, 30.0, 0, 0.8);
        assert_eq!(compute_iou(&a, &c), 0.0);
    }

    #[test]
    fn test_nms_suppresses_same_class_only() {
        let kept = non_maximum_suppression(
            vec![
                candidate(0.0, 0.0, 10.0, 10.0, 0, 0.6),
                candidate(1.0, 1.0, 10.0, 10.0, 0, 0.9),
                candidate(1.0, 1.0, 10.0, 10.0, 1, 0.7),
            ],
            0.45,
        );

        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(kept[1].class_id, 1);
    }

    #[test]
    fn test_decode_output_thresholds_and_scales() {
        // Two classes; input 640, original frame 1280x320
        let outputs = tensor(&[
            [320.0, 320.0, 64.0, 64.0, 0.1, 0.8],
            [100.0, 100.0, 10.0, 10.0, 0.1, 0.05],
        ]);
        let candidates = decode_output(&[1, 6, 2], &outputs, 2, 640, 0.25, (1280, 320)).unwrap();

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.class_id, 1);
        assert!((c.confidence - 0.8).abs() < 1e-6);
        assert!((c.x1 - 576.0).abs() < 1e-3);
        assert!((c.x2 - 704.0).abs() < 1e-3);
        assert!((c.y1 - 144.0).abs() < 1e-3);
        assert!((c.y2 - 176.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_output_rejects_bad_shape() {
        let err = decode_output(&[1, 6, 1], &[0.0; 7], 2, 640, 0.25, (10, 10)).unwrap_err();
        assert!(matches!(err, VisionError::Model(_)));

        let err = decode_output(&[6, 1], &[0.0; 6], 2, 640, 0.25, (10, 10)).unwrap_err();
        assert!(matches!(err, VisionError::Model(_)));
    }

    #[test]
    fn test_decode_output_rejects_label_count_mismatch() {
        // COCO-shaped output [1, 84, 10] read with a two-label file
        let outputs = vec![0.3; 84 * 10];
        let err = decode_output(&[1, 84, 10], &outputs, 2, 640, 0.25, (640, 640)).unwrap_err();
        assert!(matches!(err, VisionError::Model(ref m) if m.contains("80 class scores")));

        let candidates = decode_output(&[1, 84, 10], &outputs, 80, 640, 0.25, (640, 640)).unwrap();
        assert_eq!(candidates.len(), 10);
    }

    #[test]
    fn test_load_labels() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "card\n\n  face  \n").unwrap();
        let labels = load_labels(file.path()).unwrap();
        assert_eq!(labels, vec!["card".to_string(), "face".to_string()]);
    }

    #[test]
    fn test_missing_model() {
        let config = DetectorConfig {
            model_path: "/definitely/not/here.onnx".into(),
            ..Default::default()
        };
        assert!(matches!(YoloDetector::new(config), Err(VisionError::ModelNotFound(_))));
    }
}
