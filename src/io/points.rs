//! Raw point-buffer loading.
//!
//! Instance points are stored as little-endian `f32` with no header; the
//! row width comes from configuration. The same format backs both the
//! per-instance files and the consolidated shared segment.

use std::fs;
use std::path::Path;

use crate::core::types::PointCloud;
use crate::error::{AugError, Result};

/// Read a raw `f32` buffer from disk and reshape it.
pub fn load_point_buffer(path: &Path, num_features: usize) -> Result<PointCloud> {
    let bytes = fs::read(path)?;
    let floats: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    PointCloud::from_flat(floats, num_features, &path.display().to_string())
}

/// Write a cloud back out in the same raw format.
pub fn store_point_buffer(path: &Path, cloud: &PointCloud) -> Result<()> {
    let mut bytes = Vec::with_capacity(cloud.data.len() * 4);
    for value in &cloud.data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Deep-copy a row range out of a shared buffer.
///
/// Offsets are record metadata, so a range past the end means the record
/// and the buffer disagree. That is a parse-level corruption, not a
/// caller bug.
pub fn rows_from_shared(
    shared: &PointCloud,
    range: [usize; 2],
    context: &str,
) -> Result<PointCloud> {
    let [start, end] = range;
    if start > end || end > shared.len() {
        return Err(AugError::Parse(format!(
            "shared offsets [{start}, {end}) for {context} exceed buffer of {} rows",
            shared.len()
        )));
    }
    let width = shared.num_features;
    let data = shared.data[start * width..end * width].to_vec();
    PointCloud::from_flat(data, width, context)
}
