//! # Transient Storage (EIP-1153)
//!
//! Backing store of TLOAD and TSTORE.
//!
//! Transient storage:
//! - is keyed by (contract address, slot) like persistent storage
//! - follows the call frames: a reverted frame undoes its TSTOREs
//! - never reaches the backend and is cleared at the end of each transaction

use crate::domain::value_objects::{Address, StorageKey, StorageValue};
use crate::errors::StateError;
use crate::state::CheckpointMap;

/// Transient storage of one transaction.
#[derive(Debug, Default, Clone)]
pub struct TransientStorage {
    slots: CheckpointMap<(Address, StorageKey), StorageValue>,
}

impl TransientStorage {
    /// Creates a new empty transient storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a value (TLOAD). Unset slots read as zero.
    #[must_use]
    pub fn get(&self, address: Address, key: StorageKey) -> StorageValue {
        self.slots
            .get(&(address, key))
            .copied()
            .unwrap_or(StorageValue::ZERO)
    }

    /// Store a value (TSTORE).
    pub fn put(&mut self, address: Address, key: StorageKey, value: StorageValue) {
        if value.is_zero() {
            self.slots.remove(&(address, key));
        } else {
            self.slots.put((address, key), value);
        }
    }

    /// Opens a frame.
    pub fn checkpoint(&mut self) {
        self.slots.checkpoint();
    }

    /// Keeps the writes of the top frame.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointUnderflow` if no frame is open.
    pub fn commit(&mut self) -> Result<(), StateError> {
        self.slots.commit()
    }

    /// Discards the writes of the top frame.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointUnderflow` if no frame is open.
    pub fn revert(&mut self) -> Result<(), StateError> {
        self.slots.revert()
    }

    /// Drops every slot and frame.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of non-zero slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slot is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
