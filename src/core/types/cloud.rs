//! Flat point cloud storage with a runtime row width.

use serde::{Deserialize, Serialize};

use crate::error::{AugError, Result};

/// Point cloud stored as a flat row-major buffer.
///
/// Each point occupies `num_features` consecutive floats; the first three
/// are always `(x, y, z)` and the rest (intensity, elongation, timestamp,
/// ...) are carried through every operation untouched. Flat storage keeps
/// the cloud a single allocation and lets buffers loaded from disk or a
/// shared segment be adopted without reshaping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    /// Row-major values, `len() * num_features` floats
    pub data: Vec<f32>,
    /// Floats per point, at least 3
    pub num_features: usize,
}

impl PointCloud {
    /// Create an empty cloud with the given row width.
    pub fn new(num_features: usize) -> Self {
        Self {
            data: Vec::new(),
            num_features,
        }
    }

    /// Create an empty cloud with pre-allocated row capacity.
    pub fn with_capacity(num_features: usize, rows: usize) -> Self {
        Self {
            data: Vec::with_capacity(rows * num_features),
            num_features,
        }
    }

    /// Adopt a flat buffer, checking it divides into whole rows.
    pub fn from_flat(data: Vec<f32>, num_features: usize, context: &str) -> Result<Self> {
        if num_features < 3 || !data.len().is_multiple_of(num_features) {
            return Err(AugError::Shape {
                context: context.to_string(),
                len: data.len(),
                width: num_features,
            });
        }
        Ok(Self { data, num_features })
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.num_features
    }

    /// Check if the cloud has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The xyz coordinates of point `i`.
    #[inline]
    pub fn xyz(&self, i: usize) -> [f32; 3] {
        let base = i * self.num_features;
        [self.data[base], self.data[base + 1], self.data[base + 2]]
    }

    /// Full row of point `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        let base = i * self.num_features;
        &self.data[base..base + self.num_features]
    }

    /// Append one row. The slice width must match `num_features`.
    #[inline]
    pub fn push_row(&mut self, row: &[f32]) {
        debug_assert_eq!(row.len(), self.num_features);
        self.data.extend_from_slice(row);
    }

    /// Append every row of `other`. Row widths must match.
    pub fn extend_from(&mut self, other: &PointCloud) {
        debug_assert_eq!(self.num_features, other.num_features);
        self.data.extend_from_slice(&other.data);
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.num_features)
    }

    /// Keep only the rows whose mask entry is true.
    ///
    /// The mask length must equal the point count.
    pub fn filter(&self, keep: &[bool]) -> PointCloud {
        debug_assert_eq!(keep.len(), self.len());
        let mut out = PointCloud::with_capacity(self.num_features, keep.iter().filter(|&&k| k).count());
        for (row, &k) in self.rows().zip(keep.iter()) {
            if k {
                out.data.extend_from_slice(row);
            }
        }
        out
    }

    /// Translate every point by `offset` (first three columns only).
    pub fn translate(&mut self, offset: [f32; 3]) {
        for row in self.data.chunks_exact_mut(self.num_features) {
            row[0] += offset[0];
            row[1] += offset[1];
            row[2] += offset[2];
        }
    }

    /// Shift every point down by `dz` (third column).
    pub fn shift_down(&mut self, dz: f32) {
        for row in self.data.chunks_exact_mut(self.num_features) {
            row[2] -= dz;
        }
    }

    /// Overwrite the xyz of point `i`, leaving trailing features in place.
    #[inline]
    pub fn set_xyz(&mut self, i: usize, xyz: [f32; 3]) {
        let base = i * self.num_features;
        self.data[base] = xyz[0];
        self.data[base + 1] = xyz[1];
        self.data[base + 2] = xyz[2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_cloud() -> PointCloud {
        PointCloud::from_flat(
            vec![
                1.0, 2.0, 3.0, 0.5, //
                4.0, 5.0, 6.0, 0.6, //
                7.0, 8.0, 9.0, 0.7,
            ],
            4,
            "test",
        )
        .unwrap()
    }

    #[test]
    fn test_from_flat_rejects_ragged_buffer() {
        let err = PointCloud::from_flat(vec![0.0; 10], 4, "points.bin").unwrap_err();
        match err {
            AugError::Shape { context, len, width } => {
                assert_eq!(context, "points.bin");
                assert_eq!(len, 10);
                assert_eq!(width, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_flat_rejects_narrow_rows() {
        assert!(PointCloud::from_flat(vec![0.0; 4], 2, "narrow").is_err());
    }

    #[test]
    fn test_len_and_xyz() {
        let cloud = create_test_cloud();
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.xyz(1), [4.0, 5.0, 6.0]);
        assert_eq!(cloud.row(2), &[7.0, 8.0, 9.0, 0.7]);
    }

    #[test]
    fn test_translate_leaves_features() {
        let mut cloud = create_test_cloud();
        cloud.translate([10.0, 20.0, 30.0]);
        assert_eq!(cloud.xyz(0), [11.0, 22.0, 33.0]);
        assert_relative_eq!(cloud.row(0)[3], 0.5);
    }

    #[test]
    fn test_shift_down() {
        let mut cloud = create_test_cloud();
        cloud.shift_down(1.5);
        assert_relative_eq!(cloud.xyz(0)[2], 1.5);
        assert_relative_eq!(cloud.xyz(2)[2], 7.5);
    }

    #[test]
    fn test_filter() {
        let cloud = create_test_cloud();
        let kept = cloud.filter(&[true, false, true]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.xyz(0), [1.0, 2.0, 3.0]);
        assert_eq!(kept.xyz(1), [7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_extend_from() {
        let mut cloud = create_test_cloud();
        let other = create_test_cloud();
        cloud.extend_from(&other);
        assert_eq!(cloud.len(), 6);
        assert_eq!(cloud.xyz(3), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_set_xyz() {
        let mut cloud = create_test_cloud();
        cloud.set_xyz(1, [0.1, 0.2, 0.3]);
        assert_eq!(cloud.xyz(1), [0.1, 0.2, 0.3]);
        assert_relative_eq!(cloud.row(1)[3], 0.6);
    }

    #[test]
    fn test_empty_cloud() {
        let cloud = PointCloud::new(4);
        assert!(cloud.is_empty());
        assert_eq!(cloud.len(), 0);
        assert_eq!(cloud.rows().count(), 0);
    }
}
