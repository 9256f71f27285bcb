//! Per-frame detection pipeline.

use std::sync::Arc;
use std::time::Instant;

use framewire_models::DetectionBatch;
use tracing::{debug, info, warn};

use crate::annotate::Annotator;
use crate::config::VisionConfig;
use crate::detector::{normalize_detection, Detector};
use crate::error::{VisionError, VisionResult};
use crate::frame::{decode_base64, decode_frame};
use crate::yolo::YoloDetector;

/// Decodes frames, runs the shared detector once per frame and builds the batch.
///
/// Stateless apart from the optional debug image; safe to share behind an `Arc`.
pub struct FrameProcessor {
    detector: Arc<dyn Detector>,
    annotator: Option<Annotator>,
}

impl FrameProcessor {
    /// Create a processor around an already loaded detector.
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self {
            detector,
            annotator: None,
        }
    }

    /// Write an annotated copy of frames with detections.
    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    /// Validate `config`, load the YOLOv8 model and set up the debug overlay.
    pub fn from_config(config: &VisionConfig) -> VisionResult<Self> {
        config.validate()?;

        let detector = YoloDetector::new(config.detector.clone())?;
        let mut processor = Self::new(Arc::new(detector));

        if let Some(path) = &config.debug_image_path {
            let annotator = match &config.debug_font_path {
                Some(font) => Annotator::new(path).with_font_path(font)?,
                None => Annotator::new(path).with_system_font(),
            };
            info!(path = %path.display(), "Debug image output enabled");
            processor = processor.with_annotator(annotator);
        }

        Ok(processor)
    }

    pub fn detector(&self) -> &Arc<dyn Detector> {
        &self.detector
    }

    /// Run detection on an encoded image (JPEG, PNG, ...).
    ///
    /// The detector is called exactly once; its failures surface as
    /// [`VisionError::Model`] without retry.
    pub fn process(&self, encoded: &[u8]) -> VisionResult<DetectionBatch> {
        let start = Instant::now();
        let frame = decode_frame(encoded)?;

        let raw = self.detector.detect(&frame).map_err(|e| match e {
            VisionError::Model(_) => e,
            other => VisionError::model(other.to_string()),
        })?;

        let batch: DetectionBatch = raw
            .iter()
            .map(|r| normalize_detection(r, frame.width(), frame.height()))
            .collect::<VisionResult<_>>()?;

        if !batch.is_empty() {
            if let Some(annotator) = &self.annotator {
                if let Err(e) = annotator.write(&frame, &batch) {
                    warn!(error = %e, "Failed to write debug image");
                }
            }
        }

        debug!(
            width = frame.width(),
            height = frame.height(),
            detections = batch.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Frame processed"
        );

        Ok(batch)
    }

    /// Run detection on base64 image data (optionally a `data:` URL).
    pub fn process_base64(&self, data: &str) -> VisionResult<DetectionBatch> {
        let bytes = decode_base64(data)?;
        self.process(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{MockDetector, RawDetection};
    use crate::frame::tests::png_bytes;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn processor_with(mock: MockDetector) -> FrameProcessor {
        FrameProcessor::new(Arc::new(mock))
    }

    #[test]
    fn test_black_frame_no_detections() {
        let mut mock = MockDetector::new();
        mock.expect_detect().times(1).returning(|_| Ok(vec![]));

        let batch = processor_with(mock).process(&png_bytes(2, 2, [0, 0, 0])).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_single_card_detection() {
        let mut mock = MockDetector::new();
        mock.expect_detect()
            .times(1)
            .returning(|_| Ok(vec![RawDetection::new("card", 0.91, [10.0, 10.0, 50.0, 50.0])]));

        let batch = processor_with(mock).process(&png_bytes(64, 64, [0, 0, 0])).unwrap();

        assert_eq!(
            serde_json::to_string(&batch).unwrap(),
            r#"[{"class":"card","confidence":0.91,"bbox":[10,10,50,50]}]"#
        );
    }

    #[test]
    fn test_batch_length_matches_model_output() {
        let mut mock = MockDetector::new();
        mock.expect_detect().returning(|_| {
            Ok(vec![
                RawDetection::new("a", 0.3, [0.0, 0.0, 5.0, 5.0]),
                RawDetection::new("b", 0.9, [-4.0, 2.0, 100.0, 3.0]),
                RawDetection::new("c", 0.5, [7.0, 7.0, 7.0, 7.0]),
            ])
        });

        let batch = processor_with(mock).process(&png_bytes(8, 8, [9, 9, 9])).unwrap();

        assert_eq!(batch.len(), 3);
        let names: Vec<_> = batch.iter().map(|d| d.class_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        for det in &batch {
            assert!(det.bbox.x1() < det.bbox.x2());
            assert!(det.bbox.y1() < det.bbox.y2());
            assert!(det.bbox.x2() <= 8 && det.bbox.y2() <= 8);
        }
    }

    #[test]
    fn test_malformed_input_skips_model() {
        let mut mock = MockDetector::new();
        mock.expect_detect().times(0);
        let processor = processor_with(mock);

        assert!(matches!(processor.process(&[]), Err(VisionError::Decode(_))));
        assert!(matches!(processor.process(b"garbage"), Err(VisionError::Decode(_))));
    }

    #[test]
    fn test_model_failure_is_not_retried() {
        let mut mock = MockDetector::new();
        mock.expect_detect()
            .times(1)
            .returning(|_| Err(VisionError::unexpected("CUDA out of memory")));

        let err = processor_with(mock).process(&png_bytes(2, 2, [0, 0, 0])).unwrap_err();
        assert!(matches!(err, VisionError::Model(ref m) if m.contains("CUDA out of memory")));
    }

    #[test]
    fn test_idempotent_for_deterministic_model() {
        let mut mock = MockDetector::new();
        mock.expect_detect().times(2).returning(|frame| {
            Ok(vec![RawDetection::new(
                "card",
                0.5,
                [0.0, 0.0, frame.width() as f32, frame.height() as f32],
            )])
        });
        let processor = processor_with(mock);
        let input = png_bytes(10, 6, [1, 2, 3]);

        assert_eq!(processor.process(&input).unwrap(), processor.process(&input).unwrap());
    }

    #[test]
    fn test_process_base64() {
        let mut mock = MockDetector::new();
        mock.expect_detect().times(1).returning(|_| Ok(vec![]));
        let processor = processor_with(mock);

        let encoded = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(2, 2, [0, 0, 0])));
        assert!(processor.process_base64(&encoded).unwrap().is_empty());
        assert!(matches!(processor.process_base64("%%%"), Err(VisionError::Decode(_))));
    }

    #[test]
    fn test_debug_image_written_only_with_detections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.png");

        let mut mock = MockDetector::new();
        mock.expect_detect().times(1).returning(|_| Ok(vec![]));
        let processor = processor_with(mock).with_annotator(Annotator::new(&path));
        processor.process(&png_bytes(4, 4, [0, 0, 0])).unwrap();
        assert!(!path.exists());

        let mut mock = MockDetector::new();
        mock.expect_detect()
            .times(1)
            .returning(|_| Ok(vec![RawDetection::new("card", 0.8, [1.0, 1.0, 3.0, 3.0])]));
        let processor = processor_with(mock).with_annotator(Annotator::new(&path));
        processor.process(&png_bytes(4, 4, [0, 0, 0])).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_debug_write_failure_does_not_fail_frame() {
        let mut mock = MockDetector::new();
        mock.expect_detect()
            .returning(|_| Ok(vec![RawDetection::new("card", 0.8, [1.0, 1.0, 3.0, 3.0])]));
        let processor = processor_with(mock).with_annotator(Annotator::new("/no/such/dir/x.png"));

        assert_eq!(processor.process(&png_bytes(4, 4, [0, 0, 0])).unwrap().len(), 1);
    }
}
