//! Frame decoding.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, RgbImage};

use crate::error::{VisionError, VisionResult};

/// A decoded 8-bit RGB raster image.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.image.clone())
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Self::new(image)
    }
}

/// Decode an encoded image (JPEG, PNG, ...) into an RGB frame.
pub fn decode_frame(bytes: &[u8]) -> VisionResult<Frame> {
    if bytes.is_empty() {
        return Err(VisionError::decode("No image data received"));
    }

    let img = image::load_from_memory(bytes)
        .map_err(|e| VisionError::decode(format!("Failed to decode image: {}", e)))?;

    Ok(Frame::new(img.to_rgb8()))
}

/// Decode base64 image data, accepting an optional `data:<mime>;base64,` prefix.
pub fn decode_base64(data: &str) -> VisionResult<Vec<u8>> {
    let data = data.trim();
    let payload = match data.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, b64)| b64)
            .ok_or_else(|| VisionError::decode("Invalid data URL: missing ',' separator"))?,
        None => data,
    };

    // Line-wrapped base64 (MIME style) is accepted
    let payload: Cow<'_, str> = if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(payload.chars().filter(|c| !c.is_ascii_whitespace()).collect())
    } else {
        Cow::Borrowed(payload)
    };

    if payload.is_empty() {
        return Err(VisionError::decode("No image data received"));
    }

    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| VisionError::decode(format!("Invalid base64 image data: {}", e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    /// Encode a solid-color RGB image as PNG.
    pub(crate) fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let frame = decode_frame(&png_bytes(4, 3, [0, 0, 0])).unwrap();
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.image().get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_decode_empty_buffer() {
        let err = decode_frame(&[]).unwrap_err();
        assert!(matches!(err, VisionError::Decode(_)));
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_frame(b"definitely not an image").unwrap_err();
        assert!(matches!(err, VisionError::Decode(ref m) if m.starts_with("Failed to decode image")));
    }

    #[test]
    fn test_decode_base64_plain_and_data_url() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64("data:image/jpeg;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
    }

    #[test]
    fn test_decode_base64_errors() {
        assert!(matches!(decode_base64(""), Err(VisionError::Decode(_))));
        assert!(matches!(decode_base64("data:image/png;base64,"), Err(VisionError::Decode(_))));
        assert!(matches!(decode_base64("data:image/png"), Err(VisionError::Decode(_))));
        assert!(matches!(decode_base64("!!!not-base64!!!"), Err(VisionError::Decode(_))));
    }

    #[test]
    fn test_decode_base64_line_wrapped() {
        assert_eq!(decode_base64("aGVs\r\nbG8=\n").unwrap(), b"hello");
        assert_eq!(decode_base64("data:image/png;base64,aGVs bG8=").unwrap(), b"hello");
        assert!(matches!(decode_base64(" \n\t "), Err(VisionError::Decode(_))));
    }
}
