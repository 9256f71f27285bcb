//! Debug overlay for detected objects.
//!
//! Draws each detection's box and label onto a copy of the frame and writes
//! it to a single configured path. The file is overwritten by every frame
//! with detections; concurrent connections race on it.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use framewire_models::{Detection, DetectionBatch};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Fonts tried, in order, when no font file is configured.
pub const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Draws detection overlays and writes them to disk.
pub struct Annotator {
    output_path: PathBuf,
    font: Option<FontVec>,
    font_scale: f32,
    thickness: i32,
}

impl Annotator {
    /// Create an annotator that writes to `output_path` and draws boxes only.
    ///
    /// Use [`Annotator::with_font_path`] or [`Annotator::with_system_font`] for labels.
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            font: None,
            font_scale: 16.0,
            thickness: 2,
        }
    }

    /// Load a TTF/OTF font so labels are drawn above each box.
    pub fn with_font_path(mut self, font_path: &Path) -> VisionResult<Self> {
        let font_data = std::fs::read(font_path)?;
        let font = FontVec::try_from_vec(font_data).map_err(|_| {
            VisionError::invalid_config(format!("Failed to parse font file: {}", font_path.display()))
        })?;
        self.font = Some(font);
        Ok(self)
    }

    /// Load the first readable font from [`SYSTEM_FONT_PATHS`].
    ///
    /// Without one, labels are skipped and only boxes are drawn.
    pub fn with_system_font(mut self) -> Self {
        match load_first_font(SYSTEM_FONT_PATHS.iter().map(Path::new)) {
            Some((path, font)) => {
                info!(font = %path.display(), "Loaded system font for debug labels");
                self.font = Some(font);
            }
            None => warn!("No system font found, debug image labels will be skipped"),
        }
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Draw all detections onto a copy of the frame.
    pub fn annotate(&self, frame: &Frame, detections: &DetectionBatch) -> RgbImage {
        let mut img = frame.image().clone();
        for detection in detections {
            self.draw_box(&mut img, detection);
            self.draw_label(&mut img, detection);
        }
        img
    }

    /// Annotate the frame and overwrite the output file.
    pub fn write(&self, frame: &Frame, detections: &DetectionBatch) -> VisionResult<()> {
        let img = self.annotate(frame, detections);
        img.save(&self.output_path).map_err(|e| {
            VisionError::unexpected(format!(
                "Failed to write debug image {}: {}",
                self.output_path.display(),
                e
            ))
        })?;
        debug!(
            path = %self.output_path.display(),
            count = detections.len(),
            "Debug image written"
        );
        Ok(())
    }

    fn draw_box(&self, img: &mut RgbImage, detection: &Detection) {
        let bbox = detection.bbox;
        let (x, y) = (bbox.x1() as i32, bbox.y1() as i32);

        // Thicken outward; imageproc clips anything past the canvas
        for t in 0..self.thickness {
            let rect = Rect::at(x - t, y - t).of_size(
                bbox.width() + (2 * t) as u32,
                bbox.height() + (2 * t) as u32,
            );
            draw_hollow_rect_mut(img, rect, BOX_COLOR);
        }
    }

    fn draw_label(&self, img: &mut RgbImage, detection: &Detection) {
        let Some(font) = &self.font else { return };

        let x = detection.bbox.x1() as i32;
        let y = (detection.bbox.y1() as i32 - 10 - self.font_scale as i32).max(0);
        draw_text_mut(
            img,
            BOX_COLOR,
            x,
            y,
            PxScale::from(self.font_scale),
            font,
            &detection.label(),
        );
    }
}

fn load_first_font<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> Option<(&'a Path, FontVec)> {
    candidates.into_iter().find_map(|path| {
        let data = std::fs::read(path).ok()?;
        FontVec::try_from_vec(data).ok().map(|font| (path, font))
    })
}
