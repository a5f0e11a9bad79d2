//! Oriented 3D boxes and axis-aligned image boxes.

use serde::{Deserialize, Serialize};

use crate::error::{AugError, Result};

/// Oriented 3D bounding box in the lidar frame.
///
/// `(x, y, z)` is the box **center**, `(dx, dy, dz)` the full extents along
/// the box axes, and `heading` the rotation around +z in radians (0 = +x).
/// Trailing channels beyond the 7 geometry parameters (velocity, class id,
/// ...) ride along in `extra` untouched by every geometric operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Box3d {
    /// Center x in meters
    pub x: f32,
    /// Center y in meters
    pub y: f32,
    /// Center z in meters
    pub z: f32,
    /// Extent along the box x axis
    pub dx: f32,
    /// Extent along the box y axis
    pub dy: f32,
    /// Extent along the box z axis
    pub dz: f32,
    /// Rotation around +z in radians
    pub heading: f32,
    /// Trailing channels beyond the 7 geometry parameters
    #[serde(default)]
    pub extra: Vec<f32>,
}

impl Box3d {
    /// Create a box from the 7 geometry parameters.
    pub fn new(x: f32, y: f32, z: f32, dx: f32, dy: f32, dz: f32, heading: f32) -> Self {
        Self {
            x,
            y,
            z,
            dx,
            dy,
            dz,
            heading,
            extra: Vec::new(),
        }
    }

    /// Create a box from a `[x, y, z, dx, dy, dz, heading, ...]` slice.
    ///
    /// Values past the seventh are kept as `extra` channels. Fewer than
    /// seven values is a shape error.
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        if values.len() < 7 {
            return Err(AugError::Shape {
                context: "box3d".to_string(),
                len: values.len(),
                width: 7,
            });
        }
        Ok(Self {
            x: values[0],
            y: values[1],
            z: values[2],
            dx: values[3],
            dy: values[4],
            dz: values[5],
            heading: values[6],
            extra: values[7..].to_vec(),
        })
    }

    /// Flatten back to `[x, y, z, dx, dy, dz, heading, ...extra]`.
    pub fn to_vec(&self) -> Vec<f32> {
        let mut v = Vec::with_capacity(7 + self.extra.len());
        v.extend_from_slice(&[
            self.x,
            self.y,
            self.z,
            self.dx,
            self.dy,
            self.dz,
            self.heading,
        ]);
        v.extend_from_slice(&self.extra);
        v
    }

    /// Box center.
    #[inline]
    pub fn center(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// The z coordinate of the bottom face.
    #[inline]
    pub fn bottom_z(&self) -> f32 {
        self.z - self.dz / 2.0
    }
}

/// Axis-aligned 2D box in image coordinates, `(x1, y1)` top-left and
/// `(x2, y2)` bottom-right, both in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Box2d {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Box2d {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    #[inline]
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[inline]
    pub fn center(&self) -> [f32; 2] {
        [(self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0]
    }

    /// Truncate to an integer pixel rectangle (toward zero, half-open).
    #[inline]
    pub fn to_pixel_rect(&self) -> PixelRect {
        PixelRect {
            x1: self.x1 as i32,
            y1: self.y1 as i32,
            x2: self.x2 as i32,
            y2: self.y2 as i32,
        }
    }
}

/// Integer pixel rectangle with half-open bounds `[x1, x2) × [y1, y2)`.
///
/// Bounds are signed so that rectangles produced by recentering math may
/// temporarily hang over the image edge; `clip` brings them back inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelRect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    #[inline]
    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    #[inline]
    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// Clamp the rectangle to an `width × height` raster.
    pub fn clip(&self, width: usize, height: usize) -> PixelRect {
        PixelRect {
            x1: self.x1.clamp(0, width as i32),
            y1: self.y1.clamp(0, height as i32),
            x2: self.x2.clamp(0, width as i32),
            y2: self.y2.clamp(0, height as i32),
        }
    }

    /// Back to float box form.
    pub fn to_box2d(&self) -> Box2d {
        Box2d::new(self.x1 as f32, self.y1 as f32, self.x2 as f32, self.y2 as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_box3d_from_slice() {
        let b = Box3d::from_slice(&[1.0, 2.0, 3.0, 4.0, 2.0, 1.5, 0.3]).unwrap();
        assert_relative_eq!(b.x, 1.0);
        assert_relative_eq!(b.dz, 1.5);
        assert!(b.extra.is_empty());
    }

    #[test]
    fn test_box3d_from_slice_with_extra() {
        let b = Box3d::from_slice(&[1.0, 2.0, 3.0, 4.0, 2.0, 1.5, 0.3, 9.0, 8.0]).unwrap();
        assert_eq!(b.extra, vec![9.0, 8.0]);
        assert_eq!(b.to_vec().len(), 9);
    }

    #[test]
    fn test_box3d_from_short_slice_fails() {
        let err = Box3d::from_slice(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, AugError::Shape { len: 3, width: 7, .. }));
    }

    #[test]
    fn test_box3d_bottom_z() {
        let b = Box3d::new(0.0, 0.0, 1.0, 4.0, 2.0, 1.5, 0.0);
        assert_relative_eq!(b.bottom_z(), 0.25);
    }

    #[test]
    fn test_box2d_dimensions() {
        let b = Box2d::new(10.0, 20.0, 110.0, 70.0);
        assert_relative_eq!(b.width(), 100.0);
        assert_relative_eq!(b.height(), 50.0);
        assert_relative_eq!(b.area(), 5000.0);
        assert_relative_eq!(b.center()[0], 60.0);
        assert_relative_eq!(b.center()[1], 45.0);
    }

    #[test]
    fn test_degenerate_box2d_has_zero_area() {
        let b = Box2d::new(50.0, 50.0, 10.0, 10.0);
        assert_relative_eq!(b.area(), 0.0);
    }

    #[test]
    fn test_pixel_rect_truncates_toward_zero() {
        let b = Box2d::new(10.7, 20.9, 110.2, 70.5);
        let r = b.to_pixel_rect();
        assert_eq!(r, PixelRect::new(10, 20, 110, 70));
    }

    #[test]
    fn test_pixel_rect_clip() {
        let r = PixelRect::new(-5, 10, 50, 200).clip(40, 100);
        assert_eq!(r, PixelRect::new(0, 10, 40, 100));
        assert_eq!(r.width(), 40);
        assert_eq!(r.height(), 90);
    }

    #[test]
    fn test_pixel_rect_empty_after_clip() {
        let r = PixelRect::new(50, 50, 60, 60).clip(40, 40);
        assert!(r.is_empty());
    }
}
