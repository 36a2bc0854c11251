use parking_lot::Mutex;
use tracing::{debug, info};

use crate::models::{MergeError, MeshResults};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUpdate {
    /// same agent set, merged cell by cell
    Incremental,
    /// configuration changed, cache replaced wholesale
    Full,
}

/// The one lock-protected MeshResults instance of a caching controller.
/// Readers only ever get copies.
#[derive(Debug, Default)]
pub struct CachedMeshResults {
    mesh: Mutex<MeshResults>,
}

impl CachedMeshResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_incremental_update(&self, src: &MeshResults) -> bool {
        self.mesh.lock().same_agents(src)
    }

    /// Merges `src` when the agent set is unchanged, replaces the cache otherwise.
    /// The decision and the write happen under one lock acquisition.
    pub fn update_with(&self, src: MeshResults) -> CacheUpdate {
        let mut mesh = self.mesh.lock();
        match mesh.incremental_update(src) {
            Ok(()) => {
                debug!("incremental cache update");
                CacheUpdate::Incremental
            }
            Err(MergeError::AgentsMismatch {
                cached,
                incoming,
                rejected,
            }) => {
                info!(
                    "new mesh test configuration detected ({} -> {} agents), full cache update",
                    cached, incoming
                );
                *mesh = *rejected;
                CacheUpdate::Full
            }
        }
    }

    pub fn full_update(&self, src: MeshResults) {
        *self.mesh.lock() = src;
    }

    pub fn get_copy(&self) -> MeshResults {
        self.mesh.lock().clone()
    }

    /// Runs `f` against the live cache under the lock, for cheap derived reads
    pub fn inspect<T>(&self, f: impl FnOnce(&MeshResults) -> T) -> T {
        let mesh = self.mesh.lock();
        f(&mesh)
    }
}
