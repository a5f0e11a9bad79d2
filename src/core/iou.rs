//! Overlap measures between boxes.
//!
//! Collision gating works on bird's-eye-view footprints: each 3D box
//! becomes an oriented rectangle in the xy plane and pairs are scored by
//! exact polygon intersection. Image-space boxes use plain axis-aligned
//! IoU.

use crate::core::types::{Box2d, Box3d};

/// BEV footprint corners, counter-clockwise.
fn bev_corners(b: &Box3d) -> [[f32; 2]; 4] {
    let (sin_h, cos_h) = b.heading.sin_cos();
    let hx = b.dx / 2.0;
    let hy = b.dy / 2.0;
    let local = [[hx, hy], [-hx, hy], [-hx, -hy], [hx, -hy]];
    let mut corners = [[0.0f32; 2]; 4];
    for (corner, l) in corners.iter_mut().zip(local.iter()) {
        corner[0] = l[0] * cos_h - l[1] * sin_h + b.x;
        corner[1] = l[0] * sin_h + l[1] * cos_h + b.y;
    }
    corners
}

/// Signed polygon area via the shoelace formula (positive when CCW).
fn polygon_area(poly: &[[f32; 2]]) -> f32 {
    if poly.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0f32;
    for i in 0..poly.len() {
        let p = poly[i];
        let q = poly[(i + 1) % poly.len()];
        acc += p[0] * q[1] - q[0] * p[1];
    }
    acc / 2.0
}

/// Clip `subject` against one directed edge, keeping the left side.
fn clip_edge(subject: &[[f32; 2]], e0: [f32; 2], e1: [f32; 2]) -> Vec<[f32; 2]> {
    let inside = |p: [f32; 2]| {
        (e1[0] - e0[0]) * (p[1] - e0[1]) - (e1[1] - e0[1]) * (p[0] - e0[0]) >= 0.0
    };
    let intersect = |p: [f32; 2], q: [f32; 2]| {
        let d1 = [q[0] - p[0], q[1] - p[1]];
        let d2 = [e1[0] - e0[0], e1[1] - e0[1]];
        let denom = d2[0] * d1[1] - d2[1] * d1[0];
        if denom.abs() < f32::EPSILON {
            return p;
        }
        let t = (d2[0] * (p[1] - e0[1]) - d2[1] * (p[0] - e0[0])) / denom;
        [p[0] + t * d1[0], p[1] + t * d1[1]]
    };

    let mut out = Vec::with_capacity(subject.len() + 1);
    for i in 0..subject.len() {
        let cur = subject[i];
        let prev = subject[(i + subject.len() - 1) % subject.len()];
        match (inside(cur), inside(prev)) {
            (true, true) => out.push(cur),
            (true, false) => {
                out.push(intersect(prev, cur));
                out.push(cur);
            }
            (false, true) => out.push(intersect(prev, cur)),
            (false, false) => {}
        }
    }
    out
}

/// Intersection area of two convex CCW polygons (Sutherland-Hodgman).
fn convex_intersection_area(a: &[[f32; 2]; 4], b: &[[f32; 2]; 4]) -> f32 {
    let mut poly: Vec<[f32; 2]> = a.to_vec();
    for i in 0..4 {
        if poly.is_empty() {
            return 0.0;
        }
        poly = clip_edge(&poly, b[i], b[(i + 1) % 4]);
    }
    polygon_area(&poly).abs()
}

/// BEV IoU of two oriented 3D boxes. Degenerate footprints score 0.
pub fn rotated_iou(a: &Box3d, b: &Box3d) -> f32 {
    let area_a = a.dx * a.dy;
    let area_b = b.dx * b.dy;
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }
    let inter = convex_intersection_area(&bev_corners(a), &bev_corners(b));
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Row-major IoU matrix: entry `i * b.len() + j` scores `a[i]` vs `b[j]`.
pub fn rotated_iou_matrix(a: &[Box3d], b: &[Box3d]) -> Vec<f32> {
    let mut out = vec![0.0f32; a.len() * b.len()];
    for (i, box_a) in a.iter().enumerate() {
        let row = &mut out[i * b.len()..(i + 1) * b.len()];
        for (j, box_b) in b.iter().enumerate() {
            row[j] = rotated_iou(box_a, box_b);
        }
    }
    out
}

/// Axis-aligned IoU of two image boxes. Empty boxes score 0.
pub fn axis_aligned_iou(a: &Box2d, b: &Box2d) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let union = a.area() + b.area() - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Row-major axis-aligned IoU matrix, same layout as [`rotated_iou_matrix`].
pub fn axis_aligned_iou_matrix(a: &[Box2d], b: &[Box2d]) -> Vec<f32> {
    let mut out = vec![0.0f32; a.len() * b.len()];
    for (i, box_a) in a.iter().enumerate() {
        let row = &mut out[i * b.len()..(i + 1) * b.len()];
        for (j, box_b) in b.iter().enumerate() {
            row[j] = axis_aligned_iou(box_a, box_b);
        }
    }
    out
}
