//! # Account Cache
//!
//! Checkpointed account records in front of the backing store.

use super::diff::CheckpointMap;
use super::CacheStats;
use crate::domain::entities::Account;
use crate::domain::value_objects::Address;
use crate::errors::StateError;

/// Account lookup outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachedAccount {
    /// Not cached; the backing store must be consulted.
    Unknown,
    /// Known not to exist (never created, or deleted in this transaction).
    Missing,
    /// Cached record.
    Present(Account),
}

/// Address to account cache with checkpoint/commit/revert.
///
/// A stored `None` is an explicit deletion and shadows whatever the backing
/// store still holds until the next flush.
#[derive(Debug, Default)]
pub struct AccountCache {
    map: CheckpointMap<Address, Option<Account>>,
    stats: CacheStats,
}

impl AccountCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an account.
    pub fn get(&mut self, address: &Address) -> CachedAccount {
        self.stats.reads += 1;
        match self.map.get(address) {
            Some(Some(account)) => {
                self.stats.hits += 1;
                CachedAccount::Present(*account)
            }
            Some(None) => {
                self.stats.hits += 1;
                CachedAccount::Missing
            }
            None => CachedAccount::Unknown,
        }
    }

    /// Records the backing store's answer for `address`.
    pub fn fill(&mut self, address: Address, account: Option<Account>) {
        self.map.fill(address, account);
    }

    /// Writes an account.
    pub fn put(&mut self, address: Address, account: Account) {
        self.stats.writes += 1;
        self.map.put(address, Some(account));
    }

    /// Marks an account deleted.
    pub fn delete(&mut self, address: Address) {
        self.stats.deletes += 1;
        self.map.put(address, None);
    }

    /// Number of open checkpoints.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.map.depth()
    }

    /// Pushes a diff frame.
    pub fn checkpoint(&mut self) {
        self.map.checkpoint();
    }

    /// Merges the top diff frame into the one below.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointUnderflow` if no checkpoint is open.
    pub fn commit(&mut self) -> Result<(), StateError> {
        self.map.commit()
    }

    /// Undoes the top diff frame.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointUnderflow` if no checkpoint is open.
    pub fn revert(&mut self) -> Result<(), StateError> {
        self.map.revert()
    }

    /// Drains the net account changes since the last flush.
    ///
    /// `None` means the account must be deleted from the backing store.
    ///
    /// # Errors
    ///
    /// Returns `OpenCheckpoints` if a checkpoint is still open.
    pub fn flush(&mut self) -> Result<Vec<(Address, Option<Account>)>, StateError> {
        let mut changes: Vec<_> = self
            .map
            .flush()?
            .into_iter()
            .map(|(address, value)| (address, value.flatten()))
            .collect();
        changes.sort_unstable_by_key(|(address, _)| *address);
        Ok(changes)
    }

    /// Drops every cached entry and resets the statistics.
    pub fn clear(&mut self) {
        self.map.clear();
        self.stats = CacheStats::default();
    }

    /// Access statistics since the last `clear`.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
