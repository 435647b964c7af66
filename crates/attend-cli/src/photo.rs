//! Prepare a captured face photo for upload.

use anyhow::{Context, Result};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Longest edge sent to the backend; larger photos are downscaled.
pub const MAX_EDGE: u32 = 640;

/// Load an image file and return it as base64-encoded JPEG.
pub fn encode_photo(path: &Path) -> Result<String> {
    let img = image::open(path).with_context(|| format!("loading photo {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "photo loaded"
    );
    encode_image(&img)
}

pub fn encode_image(img: &DynamicImage) -> Result<String> {
    let img = if img.width().max(img.height()) > MAX_EDGE {
        img.resize(MAX_EDGE, MAX_EDGE, FilterType::Triangle)
    } else {
        img.clone()
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut jpeg = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .context("encoding photo as JPEG")?;

    Ok(BASE64_STANDARD.encode(&jpeg))
}
