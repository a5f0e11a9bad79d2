//! Merging accepted instances into the point scene.
//!
//! Order of operations matters here: original annotations are filtered by
//! the validity mask first, then scene points occluded by the incoming
//! instances are removed, and only then do instance points and boxes
//! append. The resulting point order (originals first, instances in
//! acceptance order) is what the per-point tag array describes, and image
//! compositing later keys off those tags.

use crate::core::geometry::{enlarged, outside_boxes_mask};
use crate::core::types::{SampledInstance, Scene};
use crate::error::Result;

/// Per-point provenance after a merge: -1 for surviving original points,
/// otherwise the index of the instance the point came from.
pub const ORIGINAL_POINT_TAG: i32 = -1;

/// What [`SceneCompositor::merge`] hands downstream.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// One tag per merged point, aligned with `scene.points`.
    pub point_tags: Vec<i32>,
    /// Number of original annotations that survived the validity mask.
    pub gt_number: usize,
}

/// Applies accepted instances to a scene's points and annotations.
#[derive(Debug, Clone)]
pub struct SceneCompositor {
    remove_extra_width: [f32; 3],
    use_road_plane: bool,
    aug_with_image: bool,
}

impl SceneCompositor {
    pub fn new(
        remove_extra_width: [f32; 3],
        use_road_plane: bool,
        aug_with_image: bool,
    ) -> Self {
        SceneCompositor {
            remove_extra_width,
            use_road_plane,
            aug_with_image,
        }
    }

    /// Fold `instances` into `scene`, consuming the validity mask.
    ///
    /// The instances must already be hydrated: world-frame clouds with any
    /// road-plane shift applied, corrected boxes. Consumed per-call state
    /// (`gt_boxes_mask`, and the road plane once used) is cleared from the
    /// scene here.
    pub fn merge(
        &self,
        scene: &mut Scene,
        instances: &[SampledInstance],
    ) -> Result<MergeOutcome> {
        // filter annotations down to the trainable ones
        let gt_number = match scene.gt_boxes_mask.take() {
            Some(mask) => {
                debug_assert_eq!(mask.len(), scene.gt_boxes.len());
                let mut boxes = Vec::with_capacity(mask.len());
                let mut names = Vec::with_capacity(mask.len());
                for (i, keep) in mask.iter().enumerate() {
                    if *keep {
                        boxes.push(scene.gt_boxes[i].clone());
                        names.push(scene.gt_names[i].clone());
                    }
                }
                scene.gt_boxes = boxes;
                scene.gt_names = names;
                if self.aug_with_image {
                    if let Some(boxes2d) = scene.gt_boxes2d.take() {
                        scene.gt_boxes2d = Some(
                            boxes2d
                                .into_iter()
                                .zip(mask.iter())
                                .filter_map(|(b, keep)| keep.then_some(b))
                                .collect(),
                        );
                    }
                }
                scene.gt_boxes.len()
            }
            None => scene.gt_boxes.len(),
        };

        // drop original points the incoming instances would occlude
        let occluders: Vec<_> = instances
            .iter()
            .map(|inst| enlarged(&inst.box3d, self.remove_extra_width))
            .collect();
        let keep = outside_boxes_mask(&scene.points, &occluders);
        let mut points = scene.points.filter(&keep);

        let mut tags = vec![ORIGINAL_POINT_TAG; points.len()];
        for (idx, inst) in instances.iter().enumerate() {
            debug_assert_eq!(inst.cloud.num_features, points.num_features);
            tags.extend(std::iter::repeat_n(idx as i32, inst.cloud.len()));
            points.extend_from(&inst.cloud);
            scene.gt_boxes.push(inst.box3d.clone());
            scene.gt_names.push(inst.name().to_string());
        }
        scene.points = points;

        // per-call collaborators are single-use
        if self.use_road_plane {
            scene.road_plane = None;
            if !self.aug_with_image {
                scene.calib = None;
            }
        }

        Ok(MergeOutcome {
            point_tags: tags,
            gt_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Box3d, InstanceRecord, PointCloud};
    use approx::assert_relative_eq;

    fn create_test_instance(x: f32, y: f32, rows: &[[f32; 4]]) -> SampledInstance {
        let mut cloud = PointCloud::new(4);
        for row in rows {
            cloud.push_row(row);
        }
        SampledInstance {
            record: InstanceRecord {
                name: "Car".to_string(),
                box3d_lidar: vec![x, y, -0.8, 4.0, 2.0, 1.6, 0.0],
                difficulty: 0,
                num_points_in_gt: rows.len() as u32,
                path: None,
                global_data_offset: None,
                image_idx: None,
                bbox: None,
            },
            box3d: Box3d::new(x, y, -0.8, 4.0, 2.0, 1.6, 0.0),
            box2d: None,
            mv_height: 0.0,
            cloud,
        }
    }

    fn create_test_scene() -> Scene {
        let mut points = PointCloud::new(4);
        points.push_row(&[0.0, 0.0, 0.0, 0.1]); // free space
        points.push_row(&[30.0, 5.0, -0.8, 0.2]); // inside the instance below
        points.push_row(&[-10.0, 2.0, 0.5, 0.3]); // free space
        let mut scene = Scene::new(
            vec![
                Box3d::new(5.0, 5.0, -0.8, 4.0, 2.0, 1.6, 0.0),
                Box3d::new(-5.0, -5.0, -0.8, 4.0, 2.0, 1.6, 0.0),
            ],
            vec!["Car".to_string(), "Van".to_string()],
            points,
        );
        scene.gt_boxes_mask = Some(vec![true, false]);
        scene
    }

    #[test]
    fn test_merge_filters_masked_annotations() {
        let compositor = SceneCompositor::new([0.0, 0.0, 0.0], false, false);
        let mut scene = create_test_scene();
        let outcome = compositor.merge(&mut scene, &[]).unwrap();
        assert_eq!(outcome.gt_number, 1);
        assert_eq!(scene.gt_names, vec!["Car".to_string()]);
        assert!(scene.gt_boxes_mask.is_none());
    }

    #[test]
    fn test_merge_removes_occluded_points_and_appends() {
        let compositor = SceneCompositor::new([0.5, 0.5, 0.0], false, false);
        let mut scene = create_test_scene();
        let inst = create_test_instance(
            30.0,
            5.0,
            &[[30.2, 5.1, -0.7, 0.9], [29.8, 4.9, -0.9, 0.8]],
        );
        let outcome = compositor.merge(&mut scene, &[inst]).unwrap();

        // the scene point at (30, 5) fell inside the enlarged box
        assert_eq!(scene.points.len(), 4);
        assert_eq!(outcome.point_tags, vec![-1, -1, 0, 0]);
        assert_relative_eq!(scene.points.xyz(2)[0], 30.2);

        assert_eq!(scene.gt_names, vec!["Car".to_string(), "Car".to_string()]);
        assert_eq!(scene.num_boxes(), 2);
        assert_relative_eq!(scene.gt_boxes[1].x, 30.0);
    }

    #[test]
    fn test_merge_appends_in_acceptance_order() {
        let compositor = SceneCompositor::new([0.0, 0.0, 0.0], false, false);
        let mut scene = create_test_scene();
        let a = create_test_instance(30.0, 5.0, &[[30.0, 5.0, -0.8, 0.9]]);
        let b = create_test_instance(40.0, -5.0, &[[40.0, -5.0, -0.8, 0.7]]);
        let outcome = compositor.merge(&mut scene, &[a, b]).unwrap();

        // the original point at (30, 5) falls inside instance a and goes
        let tags = outcome.point_tags;
        assert_eq!(tags, vec![-1, -1, 0, 1]);
    }

    #[test]
    fn test_merge_pops_plane_and_calib_without_image() {
        let compositor = SceneCompositor::new([0.0, 0.0, 0.0], true, false);
        let mut scene = create_test_scene();
        scene.road_plane = Some([0.0, 1.0, 0.0, -1.8]);
        compositor.merge(&mut scene, &[]).unwrap();
        assert!(scene.road_plane.is_none());
        assert!(scene.calib.is_none());
    }

    #[test]
    fn test_merge_keeps_calib_with_image() {
        use nalgebra::{Matrix3, Matrix3x4};

        let compositor = SceneCompositor::new([0.0, 0.0, 0.0], true, true);
        let mut scene = create_test_scene();
        scene.road_plane = Some([0.0, 1.0, 0.0, -1.8]);
        scene.calib = Some(
            crate::core::calib::Calibration::new(
                Matrix3x4::from_row_slice(&[
                    700.0, 0.0, 600.0, 0.0, 0.0, 700.0, 180.0, 0.0, 0.0, 0.0, 1.0, 0.0,
                ]),
                Matrix3::identity(),
                Matrix3x4::from_row_slice(&[
                    0.0, -1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0,
                ]),
            )
            .unwrap(),
        );
        scene.gt_boxes2d = Some(vec![
            crate::core::types::Box2d::new(0.0, 0.0, 10.0, 10.0),
            crate::core::types::Box2d::new(20.0, 0.0, 30.0, 10.0),
        ]);
        compositor.merge(&mut scene, &[]).unwrap();
        assert!(scene.road_plane.is_none());
        // projection still needs the calibration afterwards
        assert!(scene.calib.is_some());
        // masked 2D boxes follow the 3D mask
        assert_eq!(scene.gt_boxes2d.as_ref().unwrap().len(), 1);
    }
}
