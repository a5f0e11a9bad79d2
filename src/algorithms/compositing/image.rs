//! Pasting instance crops into the camera frame.
//!
//! Every merged annotation gets its pixels re-painted: originals from
//! their own crop of the pristine frame, sampled instances from a crop of
//! the frame they were recorded in. While pasting, three integer rasters
//! track per-pixel state (final owner as last writer, original-footprint
//! flag, multi-write overlap) plus an optional two-channel depth raster.
//! The rasters then decide which merged points remain visible.

use std::cmp::Ordering;
use std::path::PathBuf;

use crate::algorithms::compositing::scene::MergeOutcome;
use crate::core::geometry::corners_3d;
use crate::core::types::{Box3d, PixelGrid, PixelRect, SampledInstance, Scene, SceneImage};
use crate::error::{AugError, Result};
use crate::io::image::load_instance_image;

/// Background value of the ownership raster.
const NO_OWNER: i32 = -255;

/// How paste passes are sequenced over the merged annotation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PasteOrder {
    /// Paint far-to-near (descending lidar x) instead of list order.
    pub depth_sorted: bool,
    /// Flip whichever sequence the first flag produced.
    pub reversed: bool,
}

impl PasteOrder {
    /// Scan a config token for the known substrings.
    pub fn parse(token: &str) -> Self {
        PasteOrder {
            depth_sorted: token.contains("depth"),
            reversed: token.contains("reverse"),
        }
    }
}

/// What the composited frame is used for downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseMode {
    /// Filter merged points down to the visible ones.
    Annotation,
    /// Keep all points and attach the overlap raster instead.
    Projection,
}

/// Scan a config token into a mode plus the cover flag.
pub fn parse_use_mode(token: &str) -> Result<(UseMode, bool)> {
    let cover = token.contains("cover");
    if token.contains("annotation") {
        Ok((UseMode::Annotation, cover))
    } else if token.contains("projection") {
        Ok((UseMode::Projection, cover))
    } else {
        Err(AugError::Config(format!(
            "unknown image use type '{token}' (expected annotation or projection)"
        )))
    }
}

/// Composites accepted instances into the scene's camera frame.
#[derive(Debug, Clone)]
pub struct ImageCompositor {
    img_root: PathBuf,
    paste_order: PasteOrder,
    use_mode: UseMode,
    cover: bool,
    joint_sample: bool,
    keep_raw: bool,
}

impl ImageCompositor {
    pub fn new(
        img_root: PathBuf,
        paste_order: PasteOrder,
        use_mode: UseMode,
        cover: bool,
        joint_sample: bool,
        keep_raw: bool,
    ) -> Self {
        ImageCompositor {
            img_root,
            paste_order,
            use_mode,
            cover,
            joint_sample,
            keep_raw,
        }
    }

    /// Repaint the frame and, when joint sampling is on, reconcile the
    /// merged points with what the repainted frame actually shows.
    ///
    /// Expects a merged scene: `gt_boxes` holds originals then instances
    /// (in `merge` order), `gt_boxes2d` holds the masked originals only;
    /// instance 2D boxes are derived here while cropping.
    pub fn compose(
        &self,
        scene: &mut Scene,
        instances: &[SampledInstance],
        merge: &MergeOutcome,
    ) -> Result<()> {
        let mut image = scene.image.take().ok_or(AugError::MissingField("image"))?;
        let (height, width) = image.shape();
        let originals2d = scene
            .gt_boxes2d
            .take()
            .ok_or(AugError::MissingField("gt_boxes2d"))?;
        debug_assert_eq!(originals2d.len(), merge.gt_number);

        // crops of the pristine frame come first, before any pasting
        let mut rects: Vec<PixelRect> = originals2d.iter().map(|b| b.to_pixel_rect()).collect();
        let mut crops: Vec<SceneImage> = rects.iter().map(|r| image.crop(*r)).collect();

        for inst in instances {
            let image_idx = inst
                .record
                .image_idx
                .as_deref()
                .ok_or(AugError::MissingField("image_idx"))?;
            let bbox = inst.record.bbox.ok_or(AugError::MissingField("bbox"))?;
            let box2d = inst.box2d.ok_or(AugError::MissingField("box2d"))?;
            let raw = load_instance_image(&self.img_root.join(format!("{image_idx}.png")))?;
            let (raw_rect, paste_rect) =
                reconcile_crop_box(bbox, box2d.to_pixel_rect(), raw.shape());
            crops.push(raw.crop(raw_rect));
            rects.push(paste_rect);
        }
        debug_assert_eq!(rects.len(), scene.gt_boxes.len());

        let mut owner = PixelGrid::new(height, width, NO_OWNER);
        let mut fg = PixelGrid::new(height, width, 0);
        let mut overlap = PixelGrid::new(height, width, 0);
        let mut depth = self.cover.then(|| SceneImage::new(height, width, 2));

        for &idx in &paste_sequence(&scene.gt_boxes, self.paste_order) {
            let rect = rects[idx];
            let clipped = rect.clip(width, height);
            for y in clipped.y1..clipped.y2 {
                for x in clipped.x1..clipped.x2 {
                    if owner.get(y as usize, x as usize) >= 0 {
                        let v = overlap.get(y as usize, x as usize);
                        overlap.set(y as usize, x as usize, v + 1);
                    }
                }
            }
            image.paste(rect, &crops[idx]);
            owner.fill_rect(rect, idx as i32);

            if let Some(depth) = depth.as_mut() {
                let corners = corners_3d(&scene.gt_boxes[idx]);
                let min_x = corners.iter().fold(f32::MAX, |a, c| a.min(c[0]));
                let max_x = corners.iter().fold(f32::MIN, |a, c| a.max(c[0]));
                depth.fill_rect_channel(rect, 0, min_x);
                depth.fill_rect_channel(rect, 1, max_x);
            }
            if idx < merge.gt_number {
                fg.fill_rect(rect, 1);
            }
        }

        scene.gt_boxes2d = Some(rects.iter().map(PixelRect::to_box2d).collect());

        if !self.joint_sample {
            scene.image = Some(image);
            return Ok(());
        }

        let calib = scene.calib.as_ref().ok_or(AugError::MissingField("calib"))?;
        debug_assert_eq!(merge.point_tags.len(), scene.points.len());
        let mut points_2d = Vec::with_capacity(scene.points.len());
        for i in 0..scene.points.len() {
            let ([u, v], _) = calib.lidar_to_img(scene.points.xyz(i));
            points_2d.push([
                u.clamp(0.0, (width - 1) as f32) as i32,
                v.clamp(0.0, (height - 1) as f32) as i32,
            ]);
        }

        let keep: Vec<bool> = points_2d
            .iter()
            .zip(merge.point_tags.iter())
            .map(|(&[x, y], &tag)| {
                let owner_here = owner.get(y as usize, x as usize);
                if tag >= 0 {
                    // an instance point survives only where its own paste
                    // ended up on top
                    owner_here == merge.gt_number as i32 + tag
                } else if self.keep_raw {
                    true
                } else {
                    let fg_here = fg.get(y as usize, x as usize) == 1;
                    let original_owned = owner_here >= 0 && owner_here < merge.gt_number as i32;
                    (fg_here && original_owned) || (!fg_here && owner_here < 0)
                }
            })
            .collect();

        match self.use_mode {
            UseMode::Annotation => {
                scene.points = scene.points.filter(&keep);
                scene.points_2d = Some(
                    points_2d
                        .into_iter()
                        .zip(keep.iter())
                        .filter_map(|(p, &k)| k.then_some(p))
                        .collect(),
                );
            }
            UseMode::Projection => {
                scene.points_2d = Some(points_2d);
                overlap.saturate(1);
                scene.overlap_mask = Some(overlap);
                if let Some(depth) = depth.take() {
                    scene.depth_mask = Some(depth);
                }
            }
        }

        scene.image = Some(image);
        Ok(())
    }
}

/// Paste order over the merged annotation list.
fn paste_sequence(boxes: &[Box3d], order: PasteOrder) -> Vec<usize> {
    let mut seq: Vec<usize> = (0..boxes.len()).collect();
    if order.depth_sorted {
        seq.sort_by(|&a, &b| {
            boxes[a]
                .x
                .partial_cmp(&boxes[b].x)
                .unwrap_or(Ordering::Equal)
        });
        seq.reverse();
    }
    if order.reversed {
        seq.reverse();
    }
    seq
}

/// Fit an instance crop to its paste target.
///
/// The crop is centred on the stored source bbox with the paste box's
/// size. When clamping to the source frame shrinks it, the paste box is
/// recentred on itself with the shrunken size so crop and paste always
/// agree.
fn reconcile_crop_box(
    bbox: [f32; 4],
    new_box: PixelRect,
    raw_shape: (usize, usize),
) -> (PixelRect, PixelRect) {
    let (raw_h, raw_w) = raw_shape;
    let cx = (bbox[0] + bbox[2]) / 2.0;
    let cy = (bbox[1] + bbox[3]) / 2.0;
    let w = new_box.width() as f32;
    let h = new_box.height() as f32;

    let raw_rect = PixelRect::new(
        (cx - w / 2.0) as i32,
        (cy - h / 2.0) as i32,
        (cx + w / 2.0) as i32,
        (cy + h / 2.0) as i32,
    )
    .clip(raw_w, raw_h);

    if raw_rect.width() == new_box.width() && raw_rect.height() == new_box.height() {
        return (raw_rect, new_box);
    }

    let ncx = (new_box.x1 + new_box.x2) as f32 / 2.0;
    let ncy = (new_box.y1 + new_box.y2) as f32 / 2.0;
    let (sw, sh) = (raw_rect.width() as f32, raw_rect.height() as f32);
    let recentred = PixelRect::new(
        (ncx - sw / 2.0) as i32,
        (ncy - sh / 2.0) as i32,
        (ncx + sw / 2.0) as i32,
        (ncy + sh / 2.0) as i32,
    );
    (raw_rect, recentred)
}
