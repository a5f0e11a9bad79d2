//! Filesystem-facing layer: database sources, point buffers, the shared
//! segment, and instance images.

pub mod database;
pub mod fixtures;
pub mod image;
pub mod points;
pub mod shared;
