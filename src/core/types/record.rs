//! Serialized instance database records.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::box3d::Box3d;
use crate::error::Result;

/// One precomputed instance in the ground-truth database.
///
/// Records are produced offline by cropping every annotated object out of
/// its source scene. `box3d_lidar` keeps the raw flattened form so extra
/// trailing channels survive serialization round trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Class name (`"Car"`, `"Pedestrian"`, ...)
    pub name: String,
    /// `[x, y, z, dx, dy, dz, heading, ...]` in the source scene's lidar frame
    pub box3d_lidar: Vec<f32>,
    /// Annotation difficulty tag
    pub difficulty: i32,
    /// Number of lidar points that fell inside the box
    pub num_points_in_gt: u32,
    /// Per-record point buffer, relative to the database root
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `[start, end)` row range into the consolidated shared buffer
    #[serde(default)]
    pub global_data_offset: Option<[usize; 2]>,
    /// Source frame identifier (used to locate images and calibrations)
    #[serde(default)]
    pub image_idx: Option<String>,
    /// 2D annotation box in the source image, `[x1, y1, x2, y2]`
    #[serde(default)]
    pub bbox: Option<[f32; 4]>,
}

impl InstanceRecord {
    /// Parse the stored box into structured form.
    pub fn box3d(&self) -> Result<Box3d> {
        Box3d::from_slice(&self.box3d_lidar)
    }

    /// Center of the stored box, `[x, y, z]`.
    ///
    /// # Panics
    /// Panics if the record holds fewer than 3 values; records reaching
    /// this point have already passed [`Self::box3d`].
    #[inline]
    pub fn db_center(&self) -> [f32; 3] {
        [
            self.box3d_lidar[0],
            self.box3d_lidar[1],
            self.box3d_lidar[2],
        ]
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_record() -> InstanceRecord {
        InstanceRecord {
            name: "Car".to_string(),
            box3d_lidar: vec![10.0, 2.0, -0.8, 3.9, 1.6, 1.56, 0.1],
            difficulty: 0,
            num_points_in_gt: 120,
            path: Some(PathBuf::from("gt_database/000001_Car_0.bin")),
            global_data_offset: None,
            image_idx: Some("000001".to_string()),
            bbox: Some([100.0, 150.0, 200.0, 250.0]),
        }
    }

    #[test]
    fn test_box3d_parses() {
        let record = create_test_record();
        let b = record.box3d().unwrap();
        assert_relative_eq!(b.x, 10.0);
        assert_relative_eq!(b.heading, 0.1);
    }

    #[test]
    fn test_json_round_trip() {
        let record = create_test_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: InstanceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{
            "name": "Pedestrian",
            "box3d_lidar": [1.0, 2.0, 3.0, 0.8, 0.6, 1.7, 0.0],
            "difficulty": 1,
            "num_points_in_gt": 40
        }"#;
        let record: InstanceRecord = serde_json::from_str(json).unwrap();
        assert!(record.path.is_none());
        assert!(record.global_data_offset.is_none());
        assert!(record.image_idx.is_none());
        assert!(record.bbox.is_none());
    }
}
