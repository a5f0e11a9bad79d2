//! Per-call scene container and the sampled-instance carrier.

use crate::core::calib::Calibration;
use crate::core::types::{Box2d, Box3d, InstanceRecord, PixelGrid, PointCloud, SceneImage};

/// One training frame, owned in and owned out of the augmentation call.
///
/// Mandatory state is the annotated cloud; everything else is optional and
/// only required when the matching feature is enabled (road-plane
/// correction, image compositing). `gt_boxes_mask` flags which annotations
/// are valid for training; it is consumed by augmentation and always
/// `None` on the way out.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub gt_boxes: Vec<Box3d>,
    pub gt_names: Vec<String>,
    pub gt_boxes_mask: Option<Vec<bool>>,
    pub points: PointCloud,
    pub image: Option<SceneImage>,
    pub gt_boxes2d: Option<Vec<Box2d>>,
    pub calib: Option<Calibration>,
    pub road_plane: Option<[f32; 4]>,
    /// Pixel position of every point, attached by image compositing.
    pub points_2d: Option<Vec<[i32; 2]>>,
    /// Binarized multi-paste raster, attached in projection mode.
    pub overlap_mask: Option<PixelGrid>,
    /// Min/max lidar-x per pasted footprint, attached in cover mode.
    pub depth_mask: Option<SceneImage>,
}

impl Scene {
    pub fn new(
        gt_boxes: Vec<Box3d>,
        gt_names: Vec<String>,
        points: PointCloud,
    ) -> Self {
        Scene {
            gt_boxes,
            gt_names,
            points,
            ..Default::default()
        }
    }

    pub fn num_boxes(&self) -> usize {
        self.gt_boxes.len()
    }
}

/// An accepted candidate, hydrated by the engine before compositing.
///
/// `box3d` and `box2d` hold the resolved world-frame geometry (road-plane
/// corrected, refined when point refinement ran); `cloud` holds the
/// instance's points already translated into the scene. `mv_height` is the
/// vertical correction already applied, kept so nothing downstream has to
/// re-derive it.
#[derive(Debug, Clone)]
pub struct SampledInstance {
    pub record: InstanceRecord,
    pub box3d: Box3d,
    pub box2d: Option<Box2d>,
    pub mv_height: f32,
    pub cloud: PointCloud,
}

impl SampledInstance {
    pub fn name(&self) -> &str {
        &self.record.name
    }
}
