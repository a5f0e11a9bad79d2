//! Candidate placement validation.
//!
//! Sampled instances may only enter a scene where they do not collide
//! with anything already there: existing annotations, previously accepted
//! candidates, or (when image compositing is on) any 2D footprint overlap
//! above the configured threshold. 3D gating is exact (any BEV overlap
//! at all rejects) while 2D gating is thresholded, since image boxes of
//! distinct objects legitimately overlap under projection.

use log::debug;

use crate::core::calib::Calibration;
use crate::core::geometry::{camera_box_to_image_box, ground_on_road_plane, lidar_box_to_camera};
use crate::core::iou::{axis_aligned_iou_matrix, rotated_iou_matrix};
use crate::core::types::{Box2d, Box3d, Scene};
use crate::error::{AugError, Result};

/// Borrowed per-call scene state the resolver may need.
///
/// Which fields must be present depends on the enabled features; absence
/// of a required one is a [`AugError::MissingField`] at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneContext<'a> {
    pub road_plane: Option<&'a [f32; 4]>,
    pub calib: Option<&'a Calibration>,
    pub existing_boxes2d: Option<&'a [Box2d]>,
    /// Scene image shape as `(height, width)`.
    pub image_shape: Option<(usize, usize)>,
}

impl<'a> SceneContext<'a> {
    pub fn from_scene(scene: &'a Scene) -> Self {
        SceneContext {
            road_plane: scene.road_plane.as_ref(),
            calib: scene.calib.as_ref(),
            existing_boxes2d: scene.gt_boxes2d.as_deref(),
            image_shape: scene.image.as_ref().map(|img| img.shape()),
        }
    }
}

/// What survived collision resolution for one class group.
///
/// `boxes` carry the road-plane corrected geometry; `mv_heights` the
/// correction already applied to each (zero when correction is off), so
/// downstream point shifting uses the recorded value instead of
/// re-deriving it. `boxes2d` is populated only when image gating ran.
#[derive(Debug, Clone, Default)]
pub struct CollisionOutcome {
    /// Indices into the candidate slice, in order.
    pub accepted: Vec<usize>,
    pub boxes: Vec<Box3d>,
    pub mv_heights: Vec<f32>,
    pub boxes2d: Vec<Box2d>,
}

/// Stateless collision gate, configured once per sampler.
#[derive(Debug, Clone)]
pub struct CollisionResolver {
    use_road_plane: bool,
    use_image: bool,
    box_iou_thres: f32,
}

impl CollisionResolver {
    pub fn new(use_road_plane: bool, use_image: bool, box_iou_thres: f32) -> Self {
        CollisionResolver {
            use_road_plane,
            use_image,
            box_iou_thres,
        }
    }

    /// Gate `candidates` against `existing`, returning the survivors.
    ///
    /// 3D overlap is evaluated on the boxes as drawn; road-plane
    /// correction is applied afterwards so the corrected boxes are what
    /// 2D gating sees and what the outcome carries.
    pub fn resolve(
        &self,
        candidates: &[Box3d],
        existing: &[Box3d],
        ctx: &SceneContext,
    ) -> Result<CollisionOutcome> {
        let n = candidates.len();
        if n == 0 {
            return Ok(CollisionOutcome::default());
        }

        let iou_self = zero_diagonal(rotated_iou_matrix(candidates, candidates), n);
        let self_max: Vec<f32> = (0..n).map(|i| row_max(&iou_self, n, i)).collect();
        // with nothing in the scene yet, candidates are gated purely
        // against each other
        let cross_max: Vec<f32> = if existing.is_empty() {
            self_max.clone()
        } else {
            let iou_cross = rotated_iou_matrix(candidates, existing);
            (0..n).map(|i| row_max(&iou_cross, existing.len(), i)).collect()
        };
        let mut valid: Vec<bool> = (0..n)
            .map(|i| cross_max[i] + self_max[i] == 0.0)
            .collect();

        let mut corrected = candidates.to_vec();
        let mut mv_heights = vec![0.0f32; n];
        if self.use_road_plane {
            let plane = ctx.road_plane.ok_or(AugError::MissingField("road_plane"))?;
            let calib = ctx.calib.ok_or(AugError::MissingField("calib"))?;
            mv_heights = ground_on_road_plane(&mut corrected, plane, calib);
        }

        let mut boxes2d_all = Vec::new();
        if self.use_image {
            let calib = ctx.calib.ok_or(AugError::MissingField("calib"))?;
            let shape = ctx.image_shape.ok_or(AugError::MissingField("image"))?;
            let existing2d = ctx
                .existing_boxes2d
                .ok_or(AugError::MissingField("gt_boxes2d"))?;

            boxes2d_all = corrected
                .iter()
                .map(|b| camera_box_to_image_box(&lidar_box_to_camera(b, calib), calib, shape))
                .collect::<Vec<_>>();

            let iou2d_self = zero_diagonal(axis_aligned_iou_matrix(&boxes2d_all, &boxes2d_all), n);
            let self2d_max: Vec<f32> = (0..n).map(|i| row_max(&iou2d_self, n, i)).collect();
            let cross2d_max: Vec<f32> = if existing2d.is_empty() {
                self2d_max.clone()
            } else {
                let iou2d_cross = axis_aligned_iou_matrix(&boxes2d_all, existing2d);
                (0..n)
                    .map(|i| row_max(&iou2d_cross, existing2d.len(), i))
                    .collect()
            };
            for i in 0..n {
                valid[i] = valid[i]
                    && cross2d_max[i] < self.box_iou_thres
                    && self2d_max[i] < self.box_iou_thres;
            }
        }

        let accepted: Vec<usize> = (0..n).filter(|&i| valid[i]).collect();
        debug!(
            "Collision gate: {} of {} candidates accepted",
            accepted.len(),
            n
        );
        Ok(CollisionOutcome {
            boxes: accepted.iter().map(|&i| corrected[i].clone()).collect(),
            mv_heights: accepted.iter().map(|&i| mv_heights[i]).collect(),
            boxes2d: if self.use_image {
                accepted.iter().map(|&i| boxes2d_all[i]).collect()
            } else {
                Vec::new()
            },
            accepted,
        })
    }
}

fn row_max(matrix: &[f32], width: usize, row: usize) -> f32 {
    matrix[row * width..(row + 1) * width]
        .iter()
        .fold(0.0f32, |acc, &v| acc.max(v))
}

fn zero_diagonal(mut matrix: Vec<f32>, n: usize) -> Vec<f32> {
    for i in 0..n {
        matrix[i * n + i] = 0.0;
    }
    matrix
}
