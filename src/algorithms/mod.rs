//! Augmentation algorithms: deck sampling, collision gating, compositing.

pub mod collision;
pub mod compositing;
pub mod sampling;
