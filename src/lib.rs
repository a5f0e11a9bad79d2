//! BijaAug - Ground-truth database augmentation for 3D object detection
//!
//! Densifies sparse training scenes by sampling precomputed object
//! instances (points, boxes, and optionally camera crops) from an offline
//! database and compositing them into the scene without collisions.
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      bin/                           │  ← Executables
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │                 (sampler pipeline)                  │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │        (sampling, collision, compositing)           │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← Infrastructure
//! │     (database, point buffers, shared, images)       │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │          (types, geometry, IoU, calibration)        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Pipeline
//!
//! One `augment` call walks the configured class groups in order:
//!
//! 1. **Draw**: each class keeps a shuffled deck over its database
//!    records; a cyclic pointer hands out the next batch and reshuffles
//!    when exhausted.
//! 2. **Gate**: candidates whose rotated BEV footprint touches anything
//!    already in the scene (or each other) are rejected; with camera data
//!    their projected 2D boxes are gated too. Accepted boxes fold into
//!    the occupancy picture seen by later groups.
//! 3. **Hydrate**: accepted records load their point buffers (from
//!    per-record files or the shared segment), translate into scene
//!    position, and get grounded on the road plane when configured.
//! 4. **Merge**: original points inside any accepted box are dropped,
//!    instance points and annotations are appended, and per-point tags
//!    record provenance.
//! 5. **Repaint**: with camera data, every annotation's crop is pasted
//!    depth-ordered into the frame and the tags decide which merged
//!    points survive what the repainted frame shows.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bija_aug::{DatabaseSampler, SamplerConfig, Scene, SingleProcess};
//!
//! let config: SamplerConfig = serde_json::from_str(&std::fs::read_to_string("sampler.json")?)?;
//! let mut sampler = DatabaseSampler::new(config, Arc::new(SingleProcess))?;
//!
//! // In the training data loader
//! let scene: Scene = load_scene(frame_id)?;
//! let augmented = sampler.augment(scene)?;
//! ```

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: I/O infrastructure (depends on core)
// ============================================================================
pub mod io;

// ============================================================================
// Layer 3: Algorithms (depends on core, io)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 4: Engine (depends on all layers)
// ============================================================================
pub mod engine;

pub mod error;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Error handling
pub use error::{AugError, Result};

// Core types
pub use core::calib::Calibration;
pub use core::types::{Box2d, Box3d, PixelGrid, PixelRect};
pub use core::types::{InstanceRecord, PointCloud, SampledInstance, Scene, SceneImage};

// I/O - Database
pub use io::database::{DatabaseIndex, PrefilterSpec};

// I/O - Shared segments
pub use io::shared::{DistContext, SharedStore, SingleProcess};

// Algorithms
pub use algorithms::collision::{CollisionOutcome, CollisionResolver, SceneContext};
pub use algorithms::compositing::image::{ImageCompositor, PasteOrder, UseMode};
pub use algorithms::compositing::scene::{MergeOutcome, SceneCompositor};
pub use algorithms::sampling::SampleGroup;

// Engine
pub use engine::sampler::{DatabaseSampler, SamplerConfig};
