//! Camera calibration pipeline.
//!
//! Implements the three-frame projection chain used by KITTI-style
//! datasets: lidar → rectified camera → image. The pipeline is defined by
//! three matrices from the per-frame calibration file:
//!
//! - `P2` (3×4): rectified projection for the left color camera
//! - `R0_rect` (3×3): rectification rotation
//! - `Tr_velo_to_cam` (3×4): rigid lidar-to-camera transform
//!
//! Depth conventions follow the dataset's reference tooling: image
//! projection divides by the rectified z coordinate, and the reported depth
//! is the homogeneous third component minus `P2[2, 3]`.

use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3, Vector4};

use crate::error::{AugError, Result};

/// Projection chain between the lidar, rectified-camera and image frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    p2: Matrix3x4<f32>,
    r0: Matrix3<f32>,
    v2c: Matrix3x4<f32>,
    /// Cached inverse of the combined rectified transform, for rect → lidar
    rect_to_lidar_mat: Matrix4<f32>,
    cu: f32,
    cv: f32,
    fu: f32,
    fv: f32,
    tx: f32,
    ty: f32,
}

impl Calibration {
    /// Build a calibration from the three raw matrices.
    ///
    /// Fails when the combined rectified transform is not invertible.
    pub fn new(p2: Matrix3x4<f32>, r0: Matrix3<f32>, v2c: Matrix3x4<f32>) -> Result<Self> {
        let r0_ext = r0.to_homogeneous();
        let mut v2c_ext = Matrix4::identity();
        v2c_ext.fixed_view_mut::<3, 4>(0, 0).copy_from(&v2c);

        let rect_to_lidar_mat = (r0_ext * v2c_ext).try_inverse().ok_or_else(|| {
            AugError::Config("calibration: rectified transform is not invertible".to_string())
        })?;

        let fu = p2[(0, 0)];
        let fv = p2[(1, 1)];
        Ok(Self {
            p2,
            r0,
            v2c,
            rect_to_lidar_mat,
            cu: p2[(0, 2)],
            cv: p2[(1, 2)],
            fu,
            fv,
            tx: p2[(0, 3)] / (-fu),
            ty: p2[(1, 3)] / (-fv),
        })
    }

    /// Parse a per-frame calibration file.
    ///
    /// Expects whitespace-separated `key: values` lines carrying at least
    /// `P2`, `R0_rect` and `Tr_velo_to_cam`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut p2 = None;
        let mut r0 = None;
        let mut v2c = None;

        for line in text.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            match key.trim() {
                "P2" => p2 = Some(parse_floats(rest, 12, path)?),
                "R0_rect" => r0 = Some(parse_floats(rest, 9, path)?),
                "Tr_velo_to_cam" => v2c = Some(parse_floats(rest, 12, path)?),
                _ => {}
            }
        }

        let missing = |key: &str| {
            AugError::Config(format!("calibration file {} missing {key}", path.display()))
        };
        let p2 = p2.ok_or_else(|| missing("P2"))?;
        let r0 = r0.ok_or_else(|| missing("R0_rect"))?;
        let v2c = v2c.ok_or_else(|| missing("Tr_velo_to_cam"))?;

        Self::new(
            Matrix3x4::from_row_slice(&p2),
            Matrix3::from_row_slice(&r0),
            Matrix3x4::from_row_slice(&v2c),
        )
    }

    /// Lidar frame → rectified camera frame.
    pub fn lidar_to_rect(&self, p: [f32; 3]) -> [f32; 3] {
        let hom = Vector4::new(p[0], p[1], p[2], 1.0);
        let cam = self.v2c * hom;
        let rect = self.r0 * cam;
        [rect.x, rect.y, rect.z]
    }

    /// Rectified camera frame → lidar frame.
    pub fn rect_to_lidar(&self, p: [f32; 3]) -> [f32; 3] {
        let hom = Vector4::new(p[0], p[1], p[2], 1.0);
        let lidar = self.rect_to_lidar_mat * hom;
        [lidar.x, lidar.y, lidar.z]
    }

    /// Rectified camera frame → image pixel plus depth.
    ///
    /// The divisor is the rectified z coordinate, so points at or behind
    /// the camera plane produce unusable pixels exactly as the reference
    /// pipeline does; callers gate on positive depth where it matters.
    pub fn rect_to_img(&self, p: [f32; 3]) -> ([f32; 2], f32) {
        let hom = Vector4::new(p[0], p[1], p[2], 1.0);
        let q: Vector3<f32> = self.p2 * hom;
        let uv = [q.x / p[2], q.y / p[2]];
        let depth = q.z - self.p2[(2, 3)];
        (uv, depth)
    }

    /// Lidar frame → image pixel plus depth.
    pub fn lidar_to_img(&self, p: [f32; 3]) -> ([f32; 2], f32) {
        self.rect_to_img(self.lidar_to_rect(p))
    }

    /// Image pixel plus depth → rectified camera frame.
    pub fn img_to_rect(&self, u: f32, v: f32, depth: f32) -> [f32; 3] {
        let x = (u - self.cu) * depth / self.fu + self.tx;
        let y = (v - self.cv) * depth / self.fv + self.ty;
        [x, y, depth]
    }
}

fn parse_floats(text: &str, expected: usize, path: &Path) -> Result<Vec<f32>> {
    let values: Vec<f32> = text
        .split_whitespace()
        .map(|tok| tok.parse::<f32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| {
            AugError::Config(format!(
                "calibration file {}: bad float ({e})",
                path.display()
            ))
        })?;
    if values.len() != expected {
        return Err(AugError::Config(format!(
            "calibration file {}: expected {expected} values, found {}",
            path.display(),
            values.len()
        )));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Canonical axis permutation: x_cam = -y_l, y_cam = -z_l, z_cam = x_l,
    /// identity rectification, simple pinhole with principal point offset.
    fn create_test_calibration() -> Calibration {
        let p2 = Matrix3x4::from_row_slice(&[
            700.0, 0.0, 600.0, 40.0, //
            0.0, 700.0, 180.0, 2.0, //
            0.0, 0.0, 1.0, 0.01,
        ]);
        let r0 = Matrix3::identity();
        let v2c = Matrix3x4::from_row_slice(&[
            0.0, -1.0, 0.0, 0.0, //
            0.0, 0.0, -1.0, 0.0, //
            1.0, 0.0, 0.0, 0.0,
        ]);
        Calibration::new(p2, r0, v2c).unwrap()
    }

    #[test]
    fn test_lidar_to_rect_axis_permutation() {
        let calib = create_test_calibration();
        let rect = calib.lidar_to_rect([10.0, 2.0, -1.0]);
        assert_relative_eq!(rect[0], -2.0, epsilon = 1e-5);
        assert_relative_eq!(rect[1], 1.0, epsilon = 1e-5);
        assert_relative_eq!(rect[2], 10.0, epsilon = 1e-5);
    }

    #[test]
    fn test_rect_to_lidar_is_inverse() {
        let calib = create_test_calibration();
        let p = [12.5, -3.0, -0.7];
        let back = calib.rect_to_lidar(calib.lidar_to_rect(p));
        for i in 0..3 {
            assert_relative_eq!(back[i], p[i], epsilon = 1e-4);
        }
    }

    #[test]
    fn test_rect_to_img_divides_by_rect_z() {
        let calib = create_test_calibration();
        let ([u, v], depth) = calib.rect_to_img([1.0, 0.5, 10.0]);
        // u = (700*1 + 600*10 + 40) / 10, v = (700*0.5 + 180*10 + 2) / 10
        assert_relative_eq!(u, 674.0, epsilon = 1e-3);
        assert_relative_eq!(v, 215.2, epsilon = 1e-3);
        assert_relative_eq!(depth, 10.0 + 0.01 - 0.01, epsilon = 1e-4);
    }

    #[test]
    fn test_img_round_trip_recovers_rect() {
        let calib = create_test_calibration();
        let p = [1.3, -0.4, 18.0];
        let ([u, v], depth) = calib.rect_to_img(p);
        let back = calib.img_to_rect(u, v, depth);
        for i in 0..3 {
            assert_relative_eq!(back[i], p[i], epsilon = 1e-3);
        }
    }

    #[test]
    fn test_lidar_img_round_trip() {
        let calib = create_test_calibration();
        let p = [20.0, 3.0, -1.2];
        let ([u, v], depth) = calib.lidar_to_img(p);
        assert!(depth > 0.0);
        let back = calib.rect_to_lidar(calib.img_to_rect(u, v, depth));
        for i in 0..3 {
            assert_relative_eq!(back[i], p[i], epsilon = 1e-3);
        }
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("000000.txt");
        std::fs::write(
            &path,
            "P0: 1 0 0 0 0 1 0 0 0 0 1 0\n\
             P2: 700.0 0.0 600.0 40.0 0.0 700.0 180.0 2.0 0.0 0.0 1.0 0.01\n\
             R0_rect: 1 0 0 0 1 0 0 0 1\n\
             Tr_velo_to_cam: 0 -1 0 0 0 0 -1 0 1 0 0 0\n",
        )
        .unwrap();

        let calib = Calibration::from_file(&path).unwrap();
        let rect = calib.lidar_to_rect([5.0, 0.0, 0.0]);
        assert_relative_eq!(rect[2], 5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_from_file_missing_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "P2: 1 0 0 0 0 1 0 0 0 0 1 0\n").unwrap();
        let err = Calibration::from_file(&path).unwrap_err();
        assert!(matches!(err, AugError::Config(_)));
    }

    #[test]
    fn test_from_file_wrong_count() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(
            &path,
            "P2: 1 2 3\nR0_rect: 1 0 0 0 1 0 0 0 1\nTr_velo_to_cam: 0 -1 0 0 0 0 -1 0 1 0 0 0\n",
        )
        .unwrap();
        assert!(Calibration::from_file(&path).is_err());
    }
}
