//! Test fixtures for generating synthetic instance databases.
//!
//! Creates a temporary directory laid out like a real database root:
//! `db_info.json`, per-instance point buffers under `gt_database/`, a
//! consolidated `db_data.bin`, and (for the camera variant) instance
//! frames and calibration files. The directory is cleaned up when the
//! fixture is dropped.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::{Matrix3, Matrix3x4};
use tempfile::TempDir;

use crate::core::calib::Calibration;
use crate::core::types::{InstanceRecord, PointCloud, SceneImage};
use crate::io::image::store_instance_image;
use crate::io::points::store_point_buffer;

/// Focal length of the fixture camera.
pub const FIXTURE_FOCAL: f32 = 200.0;
/// Fixture frame size as `(height, width)`.
pub const FIXTURE_IMAGE_SHAPE: (usize, usize) = (96, 320);

struct FixtureRecord {
    name: &'static str,
    box3d: [f32; 7],
    num_points: usize,
    difficulty: i32,
    image_idx: Option<&'static str>,
    bbox: Option<[f32; 4]>,
}

/// On-disk database fixture with known content.
pub struct DatabaseFixture {
    temp_dir: TempDir,
    /// Row width of every buffer in the fixture.
    pub num_features: usize,
}

impl DatabaseFixture {
    /// Two classes, file-backed and consolidated buffers both present.
    ///
    /// Contains:
    /// - 4 `Car` records; the last has difficulty -1 and only 3 points,
    ///   so difficulty and min-point prefilters each remove exactly one
    /// - 2 `Pedestrian` records
    pub fn standard() -> Self {
        Self::build(
            &[
                FixtureRecord {
                    name: "Car",
                    box3d: [10.0, 0.0, -0.8, 4.0, 2.0, 1.6, 0.0],
                    num_points: 6,
                    difficulty: 0,
                    image_idx: None,
                    bbox: None,
                },
                FixtureRecord {
                    name: "Car",
                    box3d: [20.0, 6.0, -0.8, 4.2, 1.9, 1.5, 0.5],
                    num_points: 6,
                    difficulty: 1,
                    image_idx: None,
                    bbox: None,
                },
                FixtureRecord {
                    name: "Car",
                    box3d: [15.0, -6.0, -0.9, 3.8, 1.8, 1.4, -0.4],
                    num_points: 6,
                    difficulty: 2,
                    image_idx: None,
                    bbox: None,
                },
                FixtureRecord {
                    name: "Car",
                    box3d: [30.0, 2.0, -0.7, 4.5, 2.0, 1.7, 3.0],
                    num_points: 3,
                    difficulty: -1,
                    image_idx: None,
                    bbox: None,
                },
                FixtureRecord {
                    name: "Pedestrian",
                    box3d: [8.0, 4.0, -0.6, 0.8, 0.6, 1.7, 0.0],
                    num_points: 4,
                    difficulty: 0,
                    image_idx: None,
                    bbox: None,
                },
                FixtureRecord {
                    name: "Pedestrian",
                    box3d: [12.0, -4.0, -0.6, 0.7, 0.6, 1.8, 1.2],
                    num_points: 4,
                    difficulty: 0,
                    image_idx: None,
                    bbox: None,
                },
            ],
            false,
        )
    }

    /// Three `Car` records with camera data: each references a synthetic
    /// frame under `image/` and a calibration file under `calib/`, all
    /// using [`DatabaseFixture::scene_calibration`].
    pub fn with_camera_data() -> Self {
        Self::build(
            &[
                FixtureRecord {
                    name: "Car",
                    box3d: [10.0, 0.0, -0.8, 4.0, 2.0, 1.6, 0.0],
                    num_points: 6,
                    difficulty: 0,
                    image_idx: Some("000001"),
                    bbox: Some([130.0, 44.0, 190.0, 84.0]),
                },
                FixtureRecord {
                    name: "Car",
                    box3d: [16.0, 3.0, -0.8, 4.2, 1.9, 1.5, 0.3],
                    num_points: 6,
                    difficulty: 0,
                    image_idx: Some("000002"),
                    bbox: Some([100.0, 40.0, 150.0, 76.0]),
                },
                FixtureRecord {
                    name: "Car",
                    box3d: [22.0, -4.0, -0.9, 3.8, 1.8, 1.4, -0.2],
                    num_points: 6,
                    difficulty: 0,
                    image_idx: Some("000003"),
                    bbox: Some([180.0, 46.0, 220.0, 74.0]),
                },
            ],
            true,
        )
    }

    fn build(specs: &[FixtureRecord], with_camera: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let num_features = 4;
        fs::create_dir(root.join("gt_database")).expect("Failed to create gt_database");
        if with_camera {
            fs::create_dir(root.join("image")).expect("Failed to create image dir");
            fs::create_dir(root.join("calib")).expect("Failed to create calib dir");
        }

        let mut info: HashMap<String, Vec<InstanceRecord>> = HashMap::new();
        let mut consolidated = PointCloud::new(num_features);
        for (idx, spec) in specs.iter().enumerate() {
            let cloud = local_points(spec.num_points, spec.box3d, num_features);
            let rel_path = PathBuf::from(format!("gt_database/{}_{}.bin", idx, spec.name));
            store_point_buffer(&root.join(&rel_path), &cloud)
                .expect("Failed to write point buffer");

            let start = consolidated.len();
            consolidated.extend_from(&cloud);
            info.entry(spec.name.to_string())
                .or_default()
                .push(InstanceRecord {
                    name: spec.name.to_string(),
                    box3d_lidar: spec.box3d.to_vec(),
                    difficulty: spec.difficulty,
                    num_points_in_gt: spec.num_points as u32,
                    path: Some(rel_path),
                    global_data_offset: Some([start, consolidated.len()]),
                    image_idx: spec.image_idx.map(str::to_string),
                    bbox: spec.bbox,
                });

            if with_camera {
                let frame_idx = spec.image_idx.expect("camera records carry an image_idx");
                write_fixture_frame(&root.join("image").join(format!("{frame_idx}.png")));
                write_fixture_calib(&root.join("calib").join(format!("{frame_idx}.txt")));
            }
        }

        store_point_buffer(&root.join("db_data.bin"), &consolidated)
            .expect("Failed to write consolidated buffer");
        let json = serde_json::to_string_pretty(&info).expect("Failed to encode db info");
        fs::write(root.join("db_info.json"), json).expect("Failed to write db info");

        Self {
            temp_dir,
            num_features,
        }
    }

    /// Database root (the temporary directory).
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Serialized source, relative to the root.
    pub fn info_file(&self) -> PathBuf {
        PathBuf::from("db_info.json")
    }

    /// Consolidated buffer, relative to the root.
    pub fn data_file(&self) -> PathBuf {
        PathBuf::from("db_data.bin")
    }

    /// Instance frame directory, relative to the root.
    pub fn image_dir(&self) -> PathBuf {
        PathBuf::from("image")
    }

    /// Per-frame calibration directory, relative to the root.
    pub fn calib_dir(&self) -> PathBuf {
        PathBuf::from("calib")
    }

    /// The calibration every fixture frame was "captured" with.
    ///
    /// Scene-side tests use the same calibration so instance and scene
    /// geometry agree exactly.
    pub fn scene_calibration() -> Calibration {
        let p2 = Matrix3x4::from_row_slice(&[
            FIXTURE_FOCAL, 0.0, 160.0, 0.0, //
            0.0, FIXTURE_FOCAL, 48.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        ]);
        let r0 = Matrix3::identity();
        let v2c = Matrix3x4::from_row_slice(&[
            0.0, -1.0, 0.0, 0.0, //
            0.0, 0.0, -1.0, 0.0, //
            1.0, 0.0, 0.0, 0.0,
        ]);
        Calibration::new(p2, r0, v2c).expect("fixture calibration is invertible")
    }
}

/// Deterministic local-frame points spread inside the box extents.
fn local_points(n: usize, box3d: [f32; 7], num_features: usize) -> PointCloud {
    let [_, _, _, dx, dy, dz, _] = box3d;
    let mut cloud = PointCloud::with_capacity(num_features, n);
    for i in 0..n {
        let frac = i as f32 / n as f32;
        let row = [
            (frac - 0.5) * 0.8 * dx,
            ((i % 2) as f32 - 0.5) * 0.6 * dy,
            (frac - 0.5) * 0.6 * dz,
            0.1 + 0.1 * i as f32,
        ];
        cloud.push_row(&row[..num_features]);
    }
    cloud
}

fn write_fixture_frame(path: &Path) {
    let (h, w) = FIXTURE_IMAGE_SHAPE;
    let mut img = SceneImage::new(h, w, 3);
    for y in 0..h {
        for x in 0..w {
            img.set(y, x, 0, x as f32 / w as f32);
            img.set(y, x, 1, y as f32 / h as f32);
            img.set(y, x, 2, 0.5);
        }
    }
    store_instance_image(path, &img).expect("Failed to write fixture frame");
}

fn write_fixture_calib(path: &Path) {
    let text = format!(
        "P2: {f} 0 160 0 0 {f} 48 0 0 0 1 0\n\
         R0_rect: 1 0 0 0 1 0 0 0 1\n\
         Tr_velo_to_cam: 0 -1 0 0 0 0 -1 0 1 0 0 0\n",
        f = FIXTURE_FOCAL
    );
    fs::write(path, text).expect("Failed to write fixture calibration");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::database::DatabaseIndex;
    use crate::io::image::load_instance_image;
    use crate::io::points::load_point_buffer;

    #[test]
    fn test_standard_fixture_loads() {
        let fixture = DatabaseFixture::standard();
        let classes = vec!["Car".to_string(), "Pedestrian".to_string()];
        let index =
            DatabaseIndex::load(fixture.root(), &[fixture.info_file()], &classes).unwrap();
        assert_eq!(index.class_len("Car"), 4);
        assert_eq!(index.class_len("Pedestrian"), 2);

        let record = &index.class_records("Car").unwrap()[0];
        let path = fixture.root().join(record.path.as_ref().unwrap());
        let cloud = load_point_buffer(&path, fixture.num_features).unwrap();
        assert_eq!(cloud.len() as u32, record.num_points_in_gt);
    }

    #[test]
    fn test_consolidated_buffer_matches_offsets() {
        let fixture = DatabaseFixture::standard();
        let consolidated =
            load_point_buffer(&fixture.root().join(fixture.data_file()), fixture.num_features)
                .unwrap();

        let classes = vec!["Car".to_string(), "Pedestrian".to_string()];
        let index =
            DatabaseIndex::load(fixture.root(), &[fixture.info_file()], &classes).unwrap();
        let record = &index.class_records("Pedestrian").unwrap()[1];
        let [start, end] = record.global_data_offset.unwrap();
        assert_eq!(end - start, record.num_points_in_gt as usize);
        assert!(end <= consolidated.len());
    }

    #[test]
    fn test_camera_fixture_has_frames_and_calibs() {
        let fixture = DatabaseFixture::with_camera_data();
        let img = load_instance_image(
            &fixture.root().join(fixture.image_dir()).join("000001.png"),
        )
        .unwrap();
        assert_eq!(img.shape(), FIXTURE_IMAGE_SHAPE);

        let calib = Calibration::from_file(
            &fixture.root().join(fixture.calib_dir()).join("000001.txt"),
        )
        .unwrap();
        let ([u, v], depth) = calib.lidar_to_img([10.0, 0.0, 0.0]);
        let ([u2, v2], depth2) =
            DatabaseFixture::scene_calibration().lidar_to_img([10.0, 0.0, 0.0]);
        assert!((u - u2).abs() < 1e-4 && (v - v2).abs() < 1e-4);
        assert!((depth - depth2).abs() < 1e-4);
    }
}
