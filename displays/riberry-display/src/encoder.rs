//! Image preparation
//!
//! The display shows a square JPEG. Frames arriving from a camera are
//! letterboxed onto a black square, scaled down and compressed before they
//! are chunked onto the bus.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

/// Image encoding failure
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The source image has no pixels
    #[error("image has no pixels")]
    Empty,
    /// The codec rejected the image
    #[error("jpeg encoding failed")]
    Codec(#[from] image::ImageError),
}

/// Turns a frame into the bytes sent to the display
pub trait ImageEncoder {
    /// Encode `image`
    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, EncodeError>;
}

/// Pad to a centered square, resize, JPEG-encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareJpegEncoder {
    /// Edge length of the output in pixels
    pub size: u32,
    /// JPEG quality, 1-100
    pub quality: u8,
}

impl Default for SquareJpegEncoder {
    fn default() -> Self {
        Self {
            size: 128,
            quality: 75,
        }
    }
}

impl SquareJpegEncoder {
    /// Encoder with the given edge length and quality
    pub fn new(size: u32, quality: u8) -> Self {
        Self { size, quality }
    }

    /// Letterbox `image` onto a black square and scale it to `size`
    pub fn square(&self, image: &RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let side = width.max(height);
        let mut canvas = RgbImage::new(side, side);
        let x = i64::from((side - width) / 2);
        let y = i64::from((side - height) / 2);
        imageops::overlay(&mut canvas, image, x, y);
        imageops::resize(&canvas, self.size, self.size, FilterType::Triangle)
    }
}

impl ImageEncoder for SquareJpegEncoder {
    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, EncodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EncodeError::Empty);
        }
        let squared = self.square(image);

        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, self.quality).encode_image(&squared)?;
        Ok(out.into_inner())
    }
}
