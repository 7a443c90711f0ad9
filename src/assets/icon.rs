//! Icon normalization

use crate::error::AssetError;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Vector icons are stored untouched.
pub fn is_vector(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("image/svg")
}

/// Decodes a raster icon, fits it into a `size` x `size` box and re-encodes
/// it as PNG.
///
/// The aspect ratio is preserved with Lanczos resampling. Icons that already
/// fit are only re-encoded.
pub fn normalize_icon(chart_name: &str, bytes: &[u8], size: u32) -> Result<Vec<u8>, AssetError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| AssetError::IconDecodeError {
        chart: chart_name.to_string(),
        message: e.to_string(),
    })?;

    let fitted = if decoded.width() > size || decoded.height() > size {
        decoded.resize(size, size, FilterType::Lanczos3)
    } else {
        decoded
    };

    let mut encoded = Vec::new();
    DynamicImage::ImageRgba8(fitted.to_rgba8())
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .map_err(|e| AssetError::IconEncodeError {
            chart: chart_name.to_string(),
            message: e.to_string(),
        })?;
    Ok(encoded)
}
