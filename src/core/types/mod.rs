//! Core data types shared across the crate.

mod box3d;
mod cloud;
mod image;
mod record;
mod scene;

pub use box3d::{Box2d, Box3d, PixelRect};
pub use cloud::PointCloud;
pub use image::{PixelGrid, SceneImage};
pub use record::InstanceRecord;
pub use scene::{SampledInstance, Scene};
