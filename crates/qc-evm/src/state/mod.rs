//! # State Layer
//!
//! Transaction-scoped, checkpointed caches in front of the backing store.
//!
//! | Type | Holds |
//! |------|-------|
//! | [`CheckpointMap`] | generic live map plus diff frames |
//! | [`AccountCache`] | account records, explicit deletions |
//! | [`StorageCache`] | storage slots, per-address wipe markers |
//! | [`StateManager`] | both caches, code, original values, touched set |
//! | [`AccessTracker`] | EIP-2929 warm addresses and slots |

pub mod access;
pub mod account_cache;
pub mod diff;
pub mod manager;
pub mod storage_cache;

pub use access::AccessTracker;
pub use account_cache::{AccountCache, CachedAccount};
pub use diff::CheckpointMap;
pub use manager::StateManager;
pub use storage_cache::{StorageCache, StorageFlush};

/// Cache access counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups.
    pub reads: u64,
    /// Lookups answered without the backend.
    pub hits: u64,
    /// Value writes.
    pub writes: u64,
    /// Deletions and wipes.
    pub deletes: u64,
}
