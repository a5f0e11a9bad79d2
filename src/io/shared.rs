//! Shared consolidated database segment.
//!
//! With many loader processes on one machine, every process mapping its
//! own copy of the instance database wastes memory. Instead the machine
//! leader publishes one consolidated buffer into a segment directory
//! (tmpfs in production) and everyone attaches read-only. The segment is
//! raw little-endian `f32`, same format as the per-instance buffers.
//!
//! Attached data is never mutated in place: readers copy record ranges
//! out before touching them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};

use crate::core::types::PointCloud;
use crate::error::Result;
use crate::io::points::{load_point_buffer, store_point_buffer};

/// Process-group context for multi-process training.
///
/// The crate never talks to a collective-communication backend itself;
/// the training harness supplies one through this trait.
pub trait DistContext: Send + Sync {
    fn rank(&self) -> usize;
    fn world_size(&self) -> usize;
    /// Ranks per machine, for picking one publisher per host.
    fn procs_per_machine(&self) -> usize;
    /// Block until every rank has reached the same point.
    fn barrier(&self);

    fn is_machine_leader(&self) -> bool {
        self.rank() % self.procs_per_machine() == 0
    }
}

/// The trivial context: one process, no synchronization.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl DistContext for SingleProcess {
    fn rank(&self) -> usize {
        0
    }
    fn world_size(&self) -> usize {
        1
    }
    fn procs_per_machine(&self) -> usize {
        1
    }
    fn barrier(&self) {}
}

/// Handle to a published segment.
///
/// Publishing and release are collective: every rank constructs the store
/// and every rank must release it (directly or by drop), or the barrier
/// never completes.
pub struct SharedStore {
    root: PathBuf,
    key: String,
    num_features: usize,
    dist: Arc<dyn DistContext>,
    released: bool,
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("root", &self.root)
            .field("key", &self.key)
            .field("num_features", &self.num_features)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl SharedStore {
    /// Publish `source` under `root/key` and synchronize.
    ///
    /// Only the machine leader writes; everyone else just waits at the
    /// barrier. Re-publishing over an existing segment is a no-op, so a
    /// crashed-and-restarted run reuses the previous segment.
    pub fn publish(
        root: &Path,
        key: &str,
        source: &Path,
        num_features: usize,
        dist: Arc<dyn DistContext>,
    ) -> Result<Self> {
        info!("Loading GT database to shared memory");
        let segment = root.join(key);
        if dist.is_machine_leader() && !segment.exists() {
            // reading through PointCloud validates the source's shape
            let buffer = load_point_buffer(source, num_features)?;
            store_point_buffer(&segment, &buffer)?;
        }
        if dist.world_size() > 1 {
            dist.barrier();
        }
        info!("GT database has been saved to shared memory");
        Ok(SharedStore {
            root: root.to_path_buf(),
            key: key.to_string(),
            num_features,
            dist,
            released: false,
        })
    }

    /// Read the whole segment into an owned cloud.
    pub fn attach(&self) -> Result<PointCloud> {
        load_point_buffer(&self.segment_path(), self.num_features)
    }

    pub fn segment_path(&self) -> PathBuf {
        self.root.join(&self.key)
    }

    /// Tear the segment down: synchronize, then the leader removes it.
    ///
    /// Idempotent; the drop guard calls this too, so an explicit call
    /// simply gets the error reporting drop cannot provide.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        info!("Deleting GT database from shared memory");
        if self.dist.world_size() > 1 {
            self.dist.barrier();
        }
        let segment = self.segment_path();
        if self.dist.is_machine_leader() && segment.exists() {
            fs::remove_file(&segment)?;
        }
        info!("GT database has been removed from shared memory");
        Ok(())
    }
}

impl Drop for SharedStore {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!("Failed to release shared segment '{}': {}", self.key, err);
        }
    }
}
