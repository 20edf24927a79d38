//! # Storage Cache
//!
//! Checkpointed contract storage in front of the backing store.
//!
//! A cached zero value means "known to be zero". Clearing an account's
//! storage writes zero over every cached slot of that address and sets a
//! per-address marker so that uncached slots also read as zero. Both the
//! slot writes and the marker are checkpointed, so a reverted clear leaves
//! no trace.

use super::diff::CheckpointMap;
use super::CacheStats;
use crate::domain::value_objects::{Address, StorageKey, StorageValue};
use crate::errors::StateError;

/// Net storage changes drained by [`StorageCache::flush`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageFlush {
    /// Addresses whose whole storage must be wiped first.
    pub cleared: Vec<Address>,
    /// Slot writes applied after the wipes; a zero value deletes the slot.
    pub writes: Vec<(Address, StorageKey, StorageValue)>,
}

/// (address, key) to value cache with checkpoint/commit/revert.
#[derive(Debug, Default)]
pub struct StorageCache {
    slots: CheckpointMap<(Address, StorageKey), StorageValue>,
    cleared: CheckpointMap<Address, ()>,
    stats: CacheStats,
}

impl StorageCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a slot. `None` means the backing store must be consulted.
    pub fn get(&mut self, address: &Address, key: &StorageKey) -> Option<StorageValue> {
        self.stats.reads += 1;
        let hit = self
            .slots
            .get(&(*address, *key))
            .copied()
            .or_else(|| self.cleared.contains_key(address).then_some(StorageValue::ZERO));
        if hit.is_some() {
            self.stats.hits += 1;
        }
        hit
    }

    /// Records the backing store's answer for a slot.
    pub fn fill(&mut self, address: Address, key: StorageKey, value: StorageValue) {
        self.slots.fill((address, key), value);
    }

    /// Writes a slot.
    pub fn put(&mut self, address: Address, key: StorageKey, value: StorageValue) {
        self.stats.writes += 1;
        self.slots.put((address, key), value);
    }

    /// Marks a slot known-zero.
    pub fn delete(&mut self, address: Address, key: StorageKey) {
        self.stats.deletes += 1;
        self.slots.put((address, key), StorageValue::ZERO);
    }

    /// Wipes every slot of `address`.
    pub fn clear_contract_storage(&mut self, address: Address) {
        let keys: Vec<_> = self
            .slots
            .iter()
            .filter(|((owner, _), value)| *owner == address && !value.is_zero())
            .map(|(slot, _)| *slot)
            .collect();
        for slot in keys {
            self.slots.put(slot, StorageValue::ZERO);
        }
        self.cleared.put(address, ());
        self.stats.deletes += 1;
    }

    /// Returns true if the storage of `address` was wiped since the last flush.
    #[must_use]
    pub fn is_cleared(&self, address: &Address) -> bool {
        self.cleared.contains_key(address)
    }

    /// Number of open checkpoints.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.slots.depth()
    }

    /// Pushes a diff frame.
    pub fn checkpoint(&mut self) {
        self.slots.checkpoint();
        self.cleared.checkpoint();
    }

    /// Merges the top diff frame into the one below.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointUnderflow` if no checkpoint is open.
    pub fn commit(&mut self) -> Result<(), StateError> {
        self.slots.commit()?;
        self.cleared.commit()
    }

    /// Undoes the top diff frame.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointUnderflow` if no checkpoint is open.
    pub fn revert(&mut self) -> Result<(), StateError> {
        self.slots.revert()?;
        self.cleared.revert()
    }

    /// Drains the net storage changes since the last flush.
    ///
    /// After a flush the backing store reflects every wipe, so the markers
    /// are dropped and uncached slots are read through again.
    ///
    /// # Errors
    ///
    /// Returns `OpenCheckpoints` if a checkpoint is still open.
    pub fn flush(&mut self) -> Result<StorageFlush, StateError> {
        let mut cleared: Vec<Address> = self
            .cleared
            .flush()?
            .into_iter()
            .filter_map(|(address, marker)| marker.map(|()| address))
            .collect();
        cleared.sort_unstable();
        self.cleared.clear();

        let mut writes: Vec<_> = self
            .slots
            .flush()?
            .into_iter()
            .filter_map(|((address, key), value)| value.map(|v| (address, key, v)))
            .collect();
        writes.sort_unstable_by_key(|(address, key, _)| (*address, *key));

        Ok(StorageFlush { cleared, writes })
    }

    /// Drops every cached entry and resets the statistics.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.cleared.clear();
        self.stats = CacheStats::default();
    }

    /// Access statistics since the last `clear`.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
