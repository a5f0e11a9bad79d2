//! Instance image loading.
//!
//! Database crops reference full camera frames stored as PNG; they come
//! in as 8-bit RGB and are normalized to the `[0, 1]` float raster the
//! compositor works in.

use std::path::Path;

use image::RgbImage;

use crate::core::types::SceneImage;
use crate::error::{AugError, Result};

/// Load a PNG (or any format the decoder recognizes) as a float raster.
pub fn load_instance_image(path: &Path) -> Result<SceneImage> {
    let img = image::open(path)?.to_rgb8();
    let (w, h) = img.dimensions();
    let mut out = SceneImage::new(h as usize, w as usize, 3);
    for (dst, src) in out.data.iter_mut().zip(img.as_raw().iter()) {
        *dst = f32::from(*src) / 255.0;
    }
    Ok(out)
}

/// Write a 3-channel float raster back out as 8-bit PNG.
pub fn store_instance_image(path: &Path, img: &SceneImage) -> Result<()> {
    if img.channels != 3 {
        return Err(AugError::Config(format!(
            "cannot encode {}-channel raster as RGB",
            img.channels
        )));
    }
    let bytes: Vec<u8> = img
        .data
        .iter()
        .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    let buffer = RgbImage::from_raw(img.width as u32, img.height as u32, bytes)
        .ok_or_else(|| AugError::Config("raster buffer does not match its shape".to_string()))?;
    buffer.save(path)?;
    Ok(())
}
