//! Applying accepted instances to a scene.
//!
//! Split by target: `scene` merges points and annotations in the lidar
//! frame, `image` repaints the camera frame and reconciles the two.

pub mod image;
pub mod scene;
