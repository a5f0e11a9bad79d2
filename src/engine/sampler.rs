//! Ground-truth database sampling engine.
//!
//! [`DatabaseSampler`] owns everything a training loader needs to densify
//! scenes with precomputed instances: the record index, per-class sampling
//! decks, the collision gate and the compositors. One `augment` call takes
//! a scene through the whole pipeline: draw, gate, hydrate, merge, and
//! (when configured) repaint the camera frame.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::algorithms::collision::{CollisionResolver, SceneContext};
use crate::algorithms::compositing::image::{ImageCompositor, PasteOrder, parse_use_mode};
use crate::algorithms::compositing::scene::SceneCompositor;
use crate::algorithms::sampling::SampleGroup;
use crate::core::calib::Calibration;
use crate::core::geometry::{
    camera_box_to_image_box, camera_box_to_lidar, corners_3d, fakelidar_to_lidar, fit_camera_box,
};
use crate::core::types::{Box3d, PointCloud, SampledInstance, Scene};
use crate::error::{AugError, Result};
use crate::io::database::{DatabaseIndex, PrefilterSpec, parse_class_count, resolve};
use crate::io::points::{load_point_buffer, rows_from_shared};
use crate::io::shared::{DistContext, SharedStore};

/// Configuration for [`DatabaseSampler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Base directory every relative path below resolves against.
    #[serde(default)]
    pub root_path: PathBuf,

    /// Classes eligible for sampling; records of other classes are
    /// dropped at load.
    #[serde(default)]
    pub class_names: Vec<String>,

    /// Serialized database sources, merged per class in listed order.
    #[serde(default)]
    pub db_info_paths: Vec<PathBuf>,

    /// Record prefilters applied once at construction, in order.
    #[serde(default)]
    pub prepare: Vec<PrefilterSpec>,

    /// `class:count` sampling targets.
    #[serde(default)]
    pub sample_groups: Vec<String>,

    /// Row width of every point buffer (x, y, z, aux...).
    #[serde(default = "default_num_point_features")]
    pub num_point_features: usize,

    /// Subtract the scene's own count of a class from its target.
    #[serde(default)]
    pub limit_whole_scene: bool,

    /// Ground accepted boxes on the scene's road plane.
    #[serde(default)]
    pub use_road_plane: bool,

    /// Serve point buffers from a shared segment instead of per-record
    /// files.
    #[serde(default)]
    pub use_shared_memory: bool,

    /// Convert legacy fakelidar records at draw time.
    #[serde(default)]
    pub database_with_fakelidar: bool,

    /// Consolidated point buffer(s) backing the shared segment.
    #[serde(default)]
    pub db_data_paths: Vec<PathBuf>,

    /// Directory where shared segments are materialized.
    #[serde(default = "default_shm_root")]
    pub shm_root: PathBuf,

    /// Per-axis margin around accepted boxes for occlusion removal.
    #[serde(default)]
    pub remove_extra_width: [f32; 3],

    /// Composite instance crops into the camera frame.
    #[serde(default)]
    pub aug_with_image: bool,

    /// Reconcile merged points against the repainted frame.
    #[serde(default)]
    pub joint_sample: bool,

    /// Keep every original point regardless of the repainted frame.
    #[serde(default)]
    pub keep_raw: bool,

    /// 2D overlap threshold for the image collision gate.
    #[serde(default = "default_box_iou_thres")]
    pub box_iou_thres: f32,

    /// Re-express accepted instances in the scene's camera geometry.
    #[serde(default)]
    pub point_refine: bool,

    /// Paste-order token, scanned for `depth` / `reverse`.
    #[serde(default = "default_img_aug_type")]
    pub img_aug_type: String,

    /// Composited-frame use token, scanned for `annotation` /
    /// `projection` / `cover`.
    #[serde(default = "default_aug_use_type")]
    pub aug_use_type: String,

    /// Instance image directory (`<image_idx>.png`).
    #[serde(default)]
    pub img_root_path: PathBuf,

    /// Per-frame calibration directory (`<image_idx>.txt`).
    #[serde(default)]
    pub calib_root_path: PathBuf,

    /// Fixed RNG seed; `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            root_path: PathBuf::new(),
            class_names: Vec::new(),
            db_info_paths: Vec::new(),
            prepare: Vec::new(),
            sample_groups: Vec::new(),
            num_point_features: default_num_point_features(),
            limit_whole_scene: false,
            use_road_plane: false,
            use_shared_memory: false,
            database_with_fakelidar: false,
            db_data_paths: Vec::new(),
            shm_root: default_shm_root(),
            remove_extra_width: [0.0; 3],
            aug_with_image: false,
            joint_sample: false,
            keep_raw: false,
            box_iou_thres: default_box_iou_thres(),
            point_refine: false,
            img_aug_type: default_img_aug_type(),
            aug_use_type: default_aug_use_type(),
            img_root_path: PathBuf::new(),
            calib_root_path: PathBuf::new(),
            seed: None,
        }
    }
}

// Default value functions
fn default_num_point_features() -> usize {
    4
}
fn default_shm_root() -> PathBuf {
    PathBuf::from("/dev/shm")
}
fn default_box_iou_thres() -> f32 {
    1.0
}
fn default_img_aug_type() -> String {
    "by_order".to_string()
}
fn default_aug_use_type() -> String {
    "annotation".to_string()
}

/// Scene densification by sampling from a precomputed instance database.
#[derive(Debug)]
pub struct DatabaseSampler {
    config: SamplerConfig,
    index: DatabaseIndex,
    groups: Vec<SampleGroup>,
    rng: StdRng,
    resolver: CollisionResolver,
    scene_compositor: SceneCompositor,
    image_compositor: Option<ImageCompositor>,
    shared: Option<SharedStore>,
    /// Attach-once cache of the shared segment.
    shared_cloud: Option<Arc<PointCloud>>,
}

impl DatabaseSampler {
    /// Build the sampler: load and prefilter the index, publish the
    /// shared segment when configured, and prepare the sampling decks.
    ///
    /// Config token strings are parsed here so a typo fails construction
    /// rather than the first call.
    pub fn new(config: SamplerConfig, dist: Arc<dyn DistContext>) -> Result<Self> {
        if config.num_point_features < 3 {
            return Err(AugError::Config(format!(
                "num_point_features must be at least 3, got {}",
                config.num_point_features
            )));
        }

        let mut index = DatabaseIndex::load(
            &config.root_path,
            &config.db_info_paths,
            &config.class_names,
        )?;
        index.apply_prefilters(&config.prepare)?;

        let shared = if config.use_shared_memory {
            let [source] = config.db_data_paths.as_slice() else {
                return Err(AugError::Config(format!(
                    "shared memory serving expects exactly one consolidated buffer, got {}",
                    config.db_data_paths.len()
                )));
            };
            let key = source.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
                AugError::Config(format!(
                    "cannot derive a segment key from {}",
                    source.display()
                ))
            })?;
            Some(SharedStore::publish(
                &config.shm_root,
                key,
                &resolve(&config.root_path, source),
                config.num_point_features,
                dist,
            )?)
        } else {
            None
        };

        let mut groups = Vec::new();
        for token in &config.sample_groups {
            let (class, count) = parse_class_count(token)?;
            if !config.class_names.contains(&class) {
                debug!("Skipping sample group for unlisted class {class}");
                continue;
            }
            groups.push(SampleGroup::new(
                &class,
                count.max(0) as usize,
                index.class_len(&class),
            ));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let resolver = CollisionResolver::new(
            config.use_road_plane,
            config.aug_with_image,
            config.box_iou_thres,
        );
        let scene_compositor = SceneCompositor::new(
            config.remove_extra_width,
            config.use_road_plane,
            config.aug_with_image,
        );
        let image_compositor = if config.aug_with_image {
            let (use_mode, cover) = parse_use_mode(&config.aug_use_type)?;
            Some(ImageCompositor::new(
                resolve(&config.root_path, &config.img_root_path),
                PasteOrder::parse(&config.img_aug_type),
                use_mode,
                cover,
                config.joint_sample,
                config.keep_raw,
            ))
        } else {
            None
        };

        info!(
            "Database sampler ready: {} records across {} classes, {} sample groups",
            index.num_records(),
            index.classes().len(),
            groups.len()
        );
        Ok(DatabaseSampler {
            config,
            index,
            groups,
            rng,
            resolver,
            scene_compositor,
            image_compositor,
            shared,
            shared_cloud: None,
        })
    }

    /// Densify one scene.
    ///
    /// Draws per configured group, gates candidates against the scene and
    /// each other, then composites the survivors into the points (and the
    /// camera frame when configured). The scene's validity mask is
    /// consumed even when nothing survives the gate.
    pub fn augment(&mut self, mut scene: Scene) -> Result<Scene> {
        let mut existing: Vec<Box3d> = scene.gt_boxes.clone();
        let mut accepted: Vec<SampledInstance> = Vec::new();

        {
            let ctx = SceneContext::from_scene(&scene);
            for group in &mut self.groups {
                // targets count the whole annotation list, masked or not
                let target = if self.config.limit_whole_scene {
                    let in_scene = scene
                        .gt_names
                        .iter()
                        .filter(|n| n.as_str() == group.name())
                        .count();
                    group.sample_num() as i64 - in_scene as i64
                } else {
                    group.sample_num() as i64
                };
                if target <= 0 {
                    debug!(
                        "Skipping sample group {}: scene already holds enough",
                        group.name()
                    );
                    continue;
                }

                let drawn = group.draw(target as usize, &mut self.rng);
                if drawn.is_empty() {
                    continue;
                }
                let records = match self.index.class_records(group.name()) {
                    Some(records) => records,
                    None => continue,
                };

                let mut candidates = Vec::with_capacity(drawn.len());
                for &i in &drawn {
                    let mut b = records[i].box3d()?;
                    if self.config.database_with_fakelidar {
                        b = fakelidar_to_lidar(&b);
                    }
                    candidates.push(b);
                }

                let outcome = self.resolver.resolve(&candidates, &existing, &ctx)?;
                for (k, &cand) in outcome.accepted.iter().enumerate() {
                    existing.push(outcome.boxes[k].clone());
                    accepted.push(SampledInstance {
                        record: records[drawn[cand]].clone(),
                        box3d: outcome.boxes[k].clone(),
                        box2d: outcome.boxes2d.get(k).copied(),
                        mv_height: outcome.mv_heights[k],
                        cloud: PointCloud::new(self.config.num_point_features),
                    });
                }
            }
        }

        if accepted.is_empty() {
            scene.gt_boxes_mask = None;
            return Ok(scene);
        }
        debug!("Accepted {} sampled instances", accepted.len());

        self.hydrate(&mut accepted, &scene)?;
        let merge = self.scene_compositor.merge(&mut scene, &accepted)?;
        if let Some(compositor) = &self.image_compositor {
            compositor.compose(&mut scene, &accepted, &merge)?;
        }
        Ok(scene)
    }

    /// Load and place each accepted instance's points.
    fn hydrate(&mut self, instances: &mut [SampledInstance], scene: &Scene) -> Result<()> {
        if let Some(store) = &self.shared {
            if self.shared_cloud.is_none() {
                self.shared_cloud = Some(Arc::new(store.attach()?));
            }
        }

        for inst in instances.iter_mut() {
            let mut cloud = match &self.shared_cloud {
                Some(buffer) => {
                    let range = inst
                        .record
                        .global_data_offset
                        .ok_or(AugError::MissingField("global_data_offset"))?;
                    rows_from_shared(buffer, range, &inst.record.name)?
                }
                None => {
                    let path = inst
                        .record
                        .path
                        .as_ref()
                        .ok_or(AugError::MissingField("path"))?;
                    load_point_buffer(
                        &resolve(&self.config.root_path, path),
                        self.config.num_point_features,
                    )?
                }
            };

            // buffers are stored object-relative; the record's database
            // center places them in the scene
            cloud.translate(inst.record.db_center());
            cloud.shift_down(inst.mv_height);

            if self.config.point_refine && self.config.aug_with_image {
                self.refine_instance(inst, &mut cloud, scene)?;
            }
            inst.cloud = cloud;
        }
        Ok(())
    }

    /// Re-express an instance in the scene's camera geometry.
    ///
    /// Points and box corners are projected to the image through the
    /// calibration of the frame they were recorded in, then lifted back
    /// to lidar through the scene's. The box is re-fit from its
    /// round-tripped corners; the fitted box replaces both the 3D and 2D
    /// candidate geometry.
    fn refine_instance(
        &self,
        inst: &mut SampledInstance,
        cloud: &mut PointCloud,
        scene: &Scene,
    ) -> Result<()> {
        let scene_calib = scene.calib.as_ref().ok_or(AugError::MissingField("calib"))?;
        let image = scene.image.as_ref().ok_or(AugError::MissingField("image"))?;
        let image_idx = inst
            .record
            .image_idx
            .as_deref()
            .ok_or(AugError::MissingField("image_idx"))?;
        let calib_path = resolve(&self.config.root_path, &self.config.calib_root_path)
            .join(format!("{image_idx}.txt"));
        let source_calib = Calibration::from_file(&calib_path)?;

        for i in 0..cloud.len() {
            let ([u, v], depth) = source_calib.lidar_to_img(cloud.xyz(i));
            let rect = scene_calib.img_to_rect(u, v, depth);
            cloud.set_xyz(i, scene_calib.rect_to_lidar(rect));
        }

        let mut rect_corners = [[0.0f32; 3]; 8];
        for (dst, corner) in rect_corners.iter_mut().zip(corners_3d(&inst.box3d)) {
            let ([u, v], depth) = source_calib.lidar_to_img(corner);
            *dst = scene_calib.img_to_rect(u, v, depth);
        }
        let refit = fit_camera_box(&rect_corners);
        inst.box3d = camera_box_to_lidar(&refit, scene_calib);
        inst.box2d = Some(camera_box_to_image_box(&refit, scene_calib, image.shape()));
        Ok(())
    }

    /// Release the shared segment early; otherwise it goes on drop.
    pub fn release_shared(&mut self) -> Result<()> {
        self.shared_cloud = None;
        match &mut self.shared {
            Some(store) => store.release(),
            None => Ok(()),
        }
    }

    /// The prefiltered record index.
    pub fn index(&self) -> &DatabaseIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fixtures::DatabaseFixture;
    use crate::io::shared::SingleProcess;

    fn create_test_config(fixture: &DatabaseFixture) -> SamplerConfig {
        SamplerConfig {
            root_path: fixture.root().to_path_buf(),
            class_names: vec!["Car".to_string(), "Pedestrian".to_string()],
            db_info_paths: vec![fixture.info_file()],
            sample_groups: vec!["Car:3".to_string(), "Pedestrian:2".to_string()],
            num_point_features: fixture.num_features,
            seed: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_rejects_narrow_rows() {
        let fixture = DatabaseFixture::standard();
        let config = SamplerConfig {
            num_point_features: 2,
            ..create_test_config(&fixture)
        };
        let err = DatabaseSampler::new(config, Arc::new(SingleProcess)).unwrap_err();
        assert!(matches!(err, AugError::Config(_)));
    }

    #[test]
    fn test_new_rejects_unknown_prefilter() {
        let fixture = DatabaseFixture::standard();
        let config = SamplerConfig {
            prepare: vec![PrefilterSpec {
                name: "filter_by_mood".to_string(),
                removed_difficulty: Vec::new(),
                min_gt_points: Vec::new(),
            }],
            ..create_test_config(&fixture)
        };
        let err = DatabaseSampler::new(config, Arc::new(SingleProcess)).unwrap_err();
        assert!(matches!(err, AugError::Config(_)));
    }

    #[test]
    fn test_new_rejects_two_shared_sources() {
        let fixture = DatabaseFixture::standard();
        let config = SamplerConfig {
            use_shared_memory: true,
            db_data_paths: vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")],
            ..create_test_config(&fixture)
        };
        let err = DatabaseSampler::new(config, Arc::new(SingleProcess)).unwrap_err();
        assert!(matches!(err, AugError::Config(_)));
    }

    #[test]
    fn test_groups_skip_unlisted_classes() {
        let fixture = DatabaseFixture::standard();
        let config = SamplerConfig {
            sample_groups: vec!["Car:2".to_string(), "Cyclist:5".to_string()],
            ..create_test_config(&fixture)
        };
        let sampler = DatabaseSampler::new(config, Arc::new(SingleProcess)).unwrap();
        assert_eq!(sampler.groups.len(), 1);
        assert_eq!(sampler.groups[0].name(), "Car");
    }

    #[test]
    fn test_augment_empty_scene_accepts_targets() {
        let fixture = DatabaseFixture::standard();
        let config = create_test_config(&fixture);
        let mut sampler = DatabaseSampler::new(config, Arc::new(SingleProcess)).unwrap();

        let scene = Scene::new(Vec::new(), Vec::new(), PointCloud::new(4));
        let out = sampler.augment(scene).unwrap();
        // 3 Cars + 2 Pedestrians drawn into empty space, none colliding
        assert_eq!(out.gt_boxes.len(), 5);
        assert_eq!(out.gt_names.iter().filter(|n| *n == "Car").count(), 3);
        assert!(out.gt_boxes_mask.is_none());
        assert!(!out.points.is_empty());
    }

    #[test]
    fn test_augment_seeded_runs_match() {
        let fixture = DatabaseFixture::standard();
        let mut a =
            DatabaseSampler::new(create_test_config(&fixture), Arc::new(SingleProcess)).unwrap();
        let mut b =
            DatabaseSampler::new(create_test_config(&fixture), Arc::new(SingleProcess)).unwrap();

        let out_a = a
            .augment(Scene::new(Vec::new(), Vec::new(), PointCloud::new(4)))
            .unwrap();
        let out_b = b
            .augment(Scene::new(Vec::new(), Vec::new(), PointCloud::new(4)))
            .unwrap();
        assert_eq!(out_a.gt_boxes, out_b.gt_boxes);
        assert_eq!(out_a.points.data, out_b.points.data);
    }

    #[test]
    fn test_limit_whole_scene_subtracts_existing() {
        let fixture = DatabaseFixture::standard();
        let config = SamplerConfig {
            limit_whole_scene: true,
            sample_groups: vec!["Car:3".to_string()],
            ..create_test_config(&fixture)
        };
        let mut sampler = DatabaseSampler::new(config, Arc::new(SingleProcess)).unwrap();

        // two Cars already in the scene, far from every database box
        let scene = Scene::new(
            vec![
                Box3d::new(-40.0, 0.0, -1.0, 4.0, 2.0, 1.5, 0.0),
                Box3d::new(-40.0, 8.0, -1.0, 4.0, 2.0, 1.5, 0.0),
            ],
            vec!["Car".to_string(), "Car".to_string()],
            PointCloud::new(4),
        );
        let out = sampler.augment(scene).unwrap();
        assert_eq!(out.gt_names.iter().filter(|n| *n == "Car").count(), 3);
    }
}
