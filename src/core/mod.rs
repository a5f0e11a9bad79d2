//! Foundation layer: shared types, box geometry, overlap math, calibration.
//!
//! Nothing in here touches the filesystem or holds mutable state; the
//! layers above (io, algorithms, engine) build on these primitives.

pub mod calib;
pub mod geometry;
pub mod iou;
pub mod types;
