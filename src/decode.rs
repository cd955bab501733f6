//! # Decoder and Canonicalizer
//!
//! Turns raw payload bytes into a canonical in-memory image representation.
//! The canonical working space is sRGB at 8 or 16 bits per component. A
//! decode that already matches is passed through without copying; anything
//! else is redrawn into a fresh canonical buffer. No resizing, cropping or
//! filtering happens here.

use std::sync::Arc;

use image::DynamicImage;
use tracing::debug;

use crate::error::DecodeError;

/// Color space classification of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// The canonical working space.
    Srgb,
    /// Grayscale, redrawn into sRGB during normalization.
    Gray,
    /// Linear or extended-range spaces, redrawn during normalization.
    Linear,
}

/// A decoded image with its pixel buffer and depth/color-space tags.
#[derive(Clone)]
pub struct DecodedImage {
    frame: Arc<DynamicImage>,
    bits_per_component: u8,
    color_space: ColorSpace,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn bits_per_component(&self) -> u8 {
        self.bits_per_component
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    /// Raw sample bytes of the backing buffer.
    pub fn pixel_bytes(&self) -> &[u8] {
        self.frame.as_bytes()
    }

    /// Whether this frame is already in the canonical working space at a
    /// pass-through depth.
    pub fn is_canonical(&self) -> bool {
        self.color_space == ColorSpace::Srgb && self.bits_per_component <= 8
    }
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("bits_per_component", &self.bits_per_component)
            .field("color_space", &self.color_space)
            .finish()
    }
}

fn classify(color: image::ColorType) -> (u8, ColorSpace) {
    use image::ColorType::*;
    match color {
        Rgb8 | Rgba8 => (8, ColorSpace::Srgb),
        L8 | La8 => (8, ColorSpace::Gray),
        Rgb16 | Rgba16 => (16, ColorSpace::Srgb),
        L16 | La16 => (16, ColorSpace::Gray),
        Rgb32F | Rgba32F => (32, ColorSpace::Linear),
        _ => (8, ColorSpace::Linear),
    }
}

/// Decode raw bytes into an image. A failure here is terminal: identical
/// bytes would fail identically, so the pipeline never retries a decode.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let frame =
        image::load_from_memory(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let (bits_per_component, color_space) = classify(frame.color());

    Ok(DecodedImage {
        frame: Arc::new(frame),
        bits_per_component,
        color_space,
    })
}

/// Redraw into the canonical working space when the source bit depth exceeds
/// 8 or its color space is non-canonical; otherwise pass the decode through
/// unchanged, sharing the raw buffer.
pub fn normalize(image: DecodedImage) -> DecodedImage {
    if image.is_canonical() {
        return image;
    }

    debug!(
        bits = image.bits_per_component,
        color_space = ?image.color_space,
        "redrawing decoded image into canonical space"
    );

    if image.bits_per_component > 8 {
        let frame = DynamicImage::ImageRgba16(image.frame.to_rgba16());
        DecodedImage {
            frame: Arc::new(frame),
            bits_per_component: 16,
            color_space: ColorSpace::Srgb,
        }
    } else {
        let frame = DynamicImage::ImageRgba8(image.frame.to_rgba8());
        DecodedImage {
            frame: Arc::new(frame),
            bits_per_component: 8,
            color_space: ColorSpace::Srgb,
        }
    }
}
