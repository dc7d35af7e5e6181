//! Snapshot cache for desktop UI automation
//!
//! Records what was detected on screen at a point in time under a unique
//! snapshot id, so later commands ("click element B1", "type into T3") can
//! resolve a stable reference back to screen coordinates without re-running
//! detection. Two interchangeable backends sit behind one async contract:
//! a durable filesystem store for cross-process callers and a bounded
//! in-process store for long-lived hosts. Worst-case failure mode is a
//! cache miss: callers re-detect from scratch.

use std::sync::Arc;

pub mod backend;
pub mod convert;
pub mod detection;
pub mod errors;
#[cfg(test)]
mod tests;
pub mod types;

pub use backend::{DiskSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use convert::LegacyWindowTags;
pub use detection::{DetectedElement, DetectionResult, ElementType};
pub use errors::CacheError;
pub use types::{
    Bounds, CacheConfig, SnapshotInfo, SnapshotRecord, StoredElement, WindowContext,
    SNAPSHOT_VERSION,
};

/// Which backend to stand up. Both satisfy the same [`SnapshotStore`]
/// invariants despite divergent storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Directory-per-snapshot filesystem store; survives across process
    /// invocations.
    Disk,
    /// Volatile, bounded in-process store; speed over durability.
    Memory,
}

/// Builds a store of the requested kind behind the shared contract.
pub fn create_store(kind: StoreKind, config: CacheConfig) -> Arc<dyn SnapshotStore> {
    match kind {
        StoreKind::Disk => Arc::new(DiskSnapshotStore::new(config)),
        StoreKind::Memory => Arc::new(MemorySnapshotStore::new(config)),
    }
}
