//! Box geometry: corners, containment, frame conversions.
//!
//! All lidar-frame math uses the crate's box convention (center +z-up,
//! heading CCW around +z from +x). Camera-frame boxes follow the dataset
//! convention instead: bottom-center origin, y pointing down, `ry` around
//! the y axis. The conversions between the two live here so nothing else
//! in the crate needs to know both.

use crate::core::calib::Calibration;
use crate::core::types::{Box2d, Box3d, PointCloud};

/// Corner offsets in box-local units, bottom face first.
///
/// Index layout matches the database tooling: 0-3 bottom, 4-7 top, with
/// corner `i + 4` directly above corner `i`.
const CORNER_TEMPLATE: [[f32; 3]; 8] = [
    [0.5, 0.5, -0.5],
    [0.5, -0.5, -0.5],
    [-0.5, -0.5, -0.5],
    [-0.5, 0.5, -0.5],
    [0.5, 0.5, 0.5],
    [0.5, -0.5, 0.5],
    [-0.5, -0.5, 0.5],
    [-0.5, 0.5, 0.5],
];

/// The 8 corners of a lidar-frame box, world coordinates.
pub fn corners_3d(b: &Box3d) -> [[f32; 3]; 8] {
    let (sin_h, cos_h) = b.heading.sin_cos();
    let mut corners = [[0.0f32; 3]; 8];
    for (corner, t) in corners.iter_mut().zip(CORNER_TEMPLATE.iter()) {
        let lx = t[0] * b.dx;
        let ly = t[1] * b.dy;
        let lz = t[2] * b.dz;
        corner[0] = lx * cos_h - ly * sin_h + b.x;
        corner[1] = lx * sin_h + ly * cos_h + b.y;
        corner[2] = lz + b.z;
    }
    corners
}

/// Grow each extent by twice the per-axis margin (margin per side).
pub fn enlarged(b: &Box3d, margins: [f32; 3]) -> Box3d {
    let mut out = b.clone();
    out.dx += margins[0] * 2.0;
    out.dy += margins[1] * 2.0;
    out.dz += margins[2] * 2.0;
    out
}

/// Whether a point falls inside a box (boundary inclusive).
#[inline]
pub fn point_in_box(p: [f32; 3], b: &Box3d) -> bool {
    let lz = p[2] - b.z;
    if lz.abs() > b.dz / 2.0 {
        return false;
    }
    let (sin_h, cos_h) = b.heading.sin_cos();
    let dx = p[0] - b.x;
    let dy = p[1] - b.y;
    // rotate the offset into the box frame
    let lx = dx * cos_h + dy * sin_h;
    let ly = -dx * sin_h + dy * cos_h;
    lx.abs() <= b.dx / 2.0 && ly.abs() <= b.dy / 2.0
}

/// Keep mask over `points`: true where the point lies outside every box.
pub fn outside_boxes_mask(points: &PointCloud, boxes: &[Box3d]) -> Vec<bool> {
    (0..points.len())
        .map(|i| {
            let p = points.xyz(i);
            !boxes.iter().any(|b| point_in_box(p, b))
        })
        .collect()
}

/// Convert a box from the legacy fakelidar frame.
///
/// Legacy records store `[x, y, z_bottom, w, l, h, r]`; the native frame
/// wants `[x, y, z_center, l, w, h, heading]` with
/// `heading = -(r + pi/2)`.
pub fn fakelidar_to_lidar(b: &Box3d) -> Box3d {
    let mut out = b.clone();
    out.z = b.z + b.dz / 2.0;
    out.dx = b.dy;
    out.dy = b.dx;
    out.heading = -(b.heading + std::f32::consts::FRAC_PI_2);
    out
}

/// Drop boxes onto the road plane, returning the applied height deltas.
///
/// The plane `[a, b, c, d]` lives in the rectified camera frame; each box
/// center is lifted there, snapped to the plane height, and brought back.
/// The delta is what the caller must also subtract from the instance's
/// points to keep them attached to the box.
pub fn ground_on_road_plane(
    boxes: &mut [Box3d],
    plane: &[f32; 4],
    calib: &Calibration,
) -> Vec<f32> {
    let [a, b, c, d] = *plane;
    boxes
        .iter_mut()
        .map(|bx| {
            let cam = calib.lidar_to_rect(bx.center());
            let height_cam = (-d - a * cam[0] - c * cam[2]) / b;
            let grounded = calib.rect_to_lidar([cam[0], height_cam, cam[2]]);
            let mv_height = bx.z - bx.dz / 2.0 - grounded[2];
            bx.z -= mv_height;
            mv_height
        })
        .collect()
}

/// Oriented box in the rectified camera frame.
///
/// `(x, y, z)` is the **bottom** center, `l/h/w` the extents along the box
/// x/y/z axes, `ry` the rotation around the (downward) y axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBox {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub l: f32,
    pub h: f32,
    pub w: f32,
    pub ry: f32,
}

/// The 8 corners of a camera-frame box, rectified coordinates.
///
/// Bottom face (y = 0 in box space) first, matching [`corners_3d`]'s
/// bottom-then-top layout.
pub fn camera_box_corners(b: &CameraBox) -> [[f32; 3]; 8] {
    let x_t = [
        b.l / 2.0,
        b.l / 2.0,
        -b.l / 2.0,
        -b.l / 2.0,
        b.l / 2.0,
        b.l / 2.0,
        -b.l / 2.0,
        -b.l / 2.0,
    ];
    let y_t = [0.0, 0.0, 0.0, 0.0, -b.h, -b.h, -b.h, -b.h];
    let z_t = [
        b.w / 2.0,
        -b.w / 2.0,
        -b.w / 2.0,
        b.w / 2.0,
        b.w / 2.0,
        -b.w / 2.0,
        -b.w / 2.0,
        b.w / 2.0,
    ];
    let (sin_r, cos_r) = b.ry.sin_cos();
    let mut corners = [[0.0f32; 3]; 8];
    for i in 0..8 {
        corners[i][0] = x_t[i] * cos_r + z_t[i] * sin_r + b.x;
        corners[i][1] = y_t[i] + b.y;
        corners[i][2] = -x_t[i] * sin_r + z_t[i] * cos_r + b.z;
    }
    corners
}

/// Re-fit an oriented camera box from 8 corner positions.
///
/// Extents come from averaging the four edge lengths of each kind, the
/// rotation from the averaged heading-edge direction, the center from the
/// corner mean. The corners need not form an exact cuboid; this is what
/// makes the calibration round trip in point refinement well-defined.
pub fn fit_camera_box(corners: &[[f32; 3]; 8]) -> CameraBox {
    const HEIGHT_PAIRS: [(usize, usize); 4] = [(0, 4), (1, 5), (2, 6), (3, 7)];
    const WIDTH_PAIRS: [(usize, usize); 4] = [(0, 1), (2, 3), (4, 5), (6, 7)];
    const LENGTH_PAIRS: [(usize, usize); 4] = [(0, 3), (1, 2), (4, 7), (5, 6)];

    let edge = |(i, j): (usize, usize)| {
        let dx = corners[i][0] - corners[j][0];
        let dy = corners[i][1] - corners[j][1];
        let dz = corners[i][2] - corners[j][2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    };

    let height: f32 = HEIGHT_PAIRS.iter().map(|&p| edge(p)).sum::<f32>() / 4.0;
    let width: f32 = WIDTH_PAIRS.iter().map(|&p| edge(p)).sum::<f32>() / 4.0;
    let length: f32 = LENGTH_PAIRS.iter().map(|&p| edge(p)).sum::<f32>() / 4.0;

    let mut vx = 0.0f32;
    let mut vz = 0.0f32;
    for &(i, j) in &LENGTH_PAIRS {
        vx += corners[i][0] - corners[j][0];
        vz += corners[i][2] - corners[j][2];
    }
    let ry = -vz.atan2(vx);

    let mut center = [0.0f32; 3];
    for corner in corners {
        center[0] += corner[0];
        center[1] += corner[1];
        center[2] += corner[2];
    }
    center[0] /= 8.0;
    center[1] /= 8.0;
    center[2] /= 8.0;

    CameraBox {
        x: center[0],
        // corner mean is the volumetric center; the convention wants the
        // bottom center, which sits half a height further down (+y)
        y: center[1] + height / 2.0,
        z: center[2],
        l: length,
        h: height,
        w: width,
        ry,
    }
}

/// Lidar-frame box → camera-frame box.
pub fn lidar_box_to_camera(b: &Box3d, calib: &Calibration) -> CameraBox {
    let bottom = calib.lidar_to_rect([b.x, b.y, b.z - b.dz / 2.0]);
    CameraBox {
        x: bottom[0],
        y: bottom[1],
        z: bottom[2],
        l: b.dx,
        h: b.dz,
        w: b.dy,
        ry: -b.heading - std::f32::consts::FRAC_PI_2,
    }
}

/// Camera-frame box → lidar-frame box.
pub fn camera_box_to_lidar(b: &CameraBox, calib: &Calibration) -> Box3d {
    let bottom = calib.rect_to_lidar([b.x, b.y, b.z]);
    Box3d::new(
        bottom[0],
        bottom[1],
        bottom[2] + b.h / 2.0,
        b.l,
        b.w,
        b.h,
        -(b.ry + std::f32::consts::FRAC_PI_2),
    )
}

/// Camera-frame box → tightest axis-aligned image box, clamped.
pub fn camera_box_to_image_box(
    b: &CameraBox,
    calib: &Calibration,
    image_shape: (usize, usize),
) -> Box2d {
    let (height, width) = image_shape;
    let (max_u, max_v) = (width as f32 - 1.0, height as f32 - 1.0);
    let mut min = [f32::MAX, f32::MAX];
    let mut max = [f32::MIN, f32::MIN];
    for corner in camera_box_corners(b) {
        let ([u, v], _) = calib.rect_to_img(corner);
        min[0] = min[0].min(u);
        min[1] = min[1].min(v);
        max[0] = max[0].max(u);
        max[1] = max[1].max(v);
    }
    Box2d::new(
        min[0].clamp(0.0, max_u),
        min[1].clamp(0.0, max_v),
        max[0].clamp(0.0, max_u),
        max[1].clamp(0.0, max_v),
    )
}
