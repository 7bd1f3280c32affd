//! Image normalization before photos enter the pipeline or the roster.
//!
//! Reference photos are bounded to a 512 px longer edge and re-encoded as
//! JPEG; scene images are validated and passed through at capture size.

use crate::types::EncodedImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use thiserror::Error;

// --- Named constants ---
pub const REFERENCE_MAX_EDGE: u32 = 512;
pub const REFERENCE_JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("image encode failed: {0}")]
    Encode(#[source] image::ImageError),
}

/// Bound a reference photo to [`REFERENCE_MAX_EDGE`] and re-encode as JPEG.
///
/// Images already within bounds keep their dimensions; nothing is upscaled.
pub fn normalize_reference(bytes: &[u8]) -> Result<EncodedImage, NormalizeError> {
    let img = image::load_from_memory(bytes).map_err(NormalizeError::Decode)?;
    let (width, height) = (img.width(), img.height());
    let (target_w, target_h) = fit_within(width, height, REFERENCE_MAX_EDGE);

    let img = if (target_w, target_h) != (width, height) {
        tracing::debug!(width, height, target_w, target_h, "downscaling reference photo");
        img.resize_exact(target_w, target_h, FilterType::Triangle)
    } else {
        img
    };

    let jpeg = encode_jpeg(&img, REFERENCE_JPEG_QUALITY)?;
    Ok(EncodedImage::new("image/jpeg", jpeg))
}

/// Validate a captured scene image and return it unscaled.
///
/// The bytes are decoded once to reject corrupt input, then passed through
/// untouched with the media type sniffed from their magic bytes.
pub fn normalize_scene(bytes: &[u8]) -> Result<EncodedImage, NormalizeError> {
    let format = image::guess_format(bytes).map_err(NormalizeError::Decode)?;
    image::load_from_memory_with_format(bytes, format).map_err(NormalizeError::Decode)?;
    Ok(EncodedImage::new(format.to_mime_type(), bytes.to_vec()))
}

/// Dimensions that fit `(width, height)` inside a `max_edge` square,
/// preserving aspect ratio. Returns the input unchanged if it already fits.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= max_edge || longer == 0 {
        return (width, height);
    }
    let scale = max_edge as f64 / longer as f64;
    let scaled = |v: u32| ((v as f64 * scale).round() as u32).clamp(1, max_edge);
    if width >= height {
        (max_edge, scaled(height))
    } else {
        (scaled(width), max_edge)
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, NormalizeError> {
    // JPEG carries no alpha channel; flatten to RGB first.
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(NormalizeError::Encode)?;
    Ok(out)
}
