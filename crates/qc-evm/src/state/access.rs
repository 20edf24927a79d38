//! # Access Tracker (EIP-2929 / EIP-2930)
//!
//! Warm/cold bookkeeping for addresses and storage slots.
//!
//! Warmth is transaction-scoped and frame-stacked: every checkpoint opens a
//! frame that records what it warmed, and reverting the frame makes those
//! entries cold again. Entries added with `add_always_warm_*` (declared
//! access list, precompiles, origin, target, coinbase) survive reverts.

use crate::domain::value_objects::{Address, StorageKey};
use crate::errors::StateError;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Default)]
struct AccessFrame {
    addresses: Vec<Address>,
    slots: Vec<(Address, StorageKey)>,
}

/// Warm set tracker of one transaction.
#[derive(Debug, Default)]
pub struct AccessTracker {
    warm_addresses: HashSet<Address>,
    warm_slots: HashSet<(Address, StorageKey)>,
    always_warm_addresses: HashSet<Address>,
    always_warm_slots: HashSet<(Address, StorageKey)>,
    frames: Vec<AccessFrame>,
    report: Option<BTreeMap<Address, BTreeSet<StorageKey>>>,
}

impl AccessTracker {
    /// Create a new empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything, including always-warm entries and frames.
    ///
    /// Reporting stays enabled if it was, with an empty report.
    pub fn reset(&mut self) {
        self.warm_addresses.clear();
        self.warm_slots.clear();
        self.always_warm_addresses.clear();
        self.always_warm_slots.clear();
        self.frames.clear();
        if let Some(report) = self.report.as_mut() {
            report.clear();
        }
    }

    /// Starts collecting every warmed entry for [`AccessTracker::access_list`].
    pub fn enable_reporting(&mut self) {
        self.report.get_or_insert_with(BTreeMap::new);
    }

    /// Returns true if `address` is warm.
    #[must_use]
    pub fn is_warm_address(&self, address: &Address) -> bool {
        self.warm_addresses.contains(address)
    }

    /// Returns true if the slot is warm.
    #[must_use]
    pub fn is_warm_slot(&self, address: &Address, key: &StorageKey) -> bool {
        self.warm_slots.contains(&(*address, *key))
    }

    /// Warms `address`. Returns true if it was cold.
    pub fn warm_address(&mut self, address: Address) -> bool {
        if !self.warm_addresses.insert(address) {
            return false;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.addresses.push(address);
        }
        if let Some(report) = self.report.as_mut() {
            report.entry(address).or_default();
        }
        true
    }

    /// Warms a slot. Returns true if it was cold.
    pub fn warm_slot(&mut self, address: Address, key: StorageKey) -> bool {
        if !self.warm_slots.insert((address, key)) {
            return false;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.slots.push((address, key));
        }
        if let Some(report) = self.report.as_mut() {
            report.entry(address).or_default().insert(key);
        }
        true
    }

    /// Warms `address` for the rest of the transaction, reverts included.
    pub fn add_always_warm_address(&mut self, address: Address) {
        self.always_warm_addresses.insert(address);
        self.warm_address(address);
    }

    /// Warms a slot for the rest of the transaction, reverts included.
    pub fn add_always_warm_slot(&mut self, address: Address, key: StorageKey) {
        self.always_warm_slots.insert((address, key));
        self.warm_slot(address, key);
    }

    /// Opens a frame.
    pub fn checkpoint(&mut self) {
        self.frames.push(AccessFrame::default());
    }

    /// Closes the top frame, keeping what it warmed.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointUnderflow` if no frame is open.
    pub fn commit(&mut self) -> Result<(), StateError> {
        let top = self
            .frames
            .pop()
            .ok_or(StateError::CheckpointUnderflow("commit"))?;
        if let Some(below) = self.frames.last_mut() {
            below.addresses.extend(top.addresses);
            below.slots.extend(top.slots);
        }
        Ok(())
    }

    /// Closes the top frame, cooling what it warmed.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointUnderflow` if no frame is open.
    pub fn revert(&mut self) -> Result<(), StateError> {
        let top = self
            .frames
            .pop()
            .ok_or(StateError::CheckpointUnderflow("revert"))?;
        for address in top.addresses {
            if !self.always_warm_addresses.contains(&address) {
                self.warm_addresses.remove(&address);
            }
        }
        for slot in top.slots {
            if !self.always_warm_slots.contains(&slot) {
                self.warm_slots.remove(&slot);
            }
        }
        Ok(())
    }

    /// Every address and slot warmed since reporting was enabled.
    ///
    /// Returns an empty list unless reporting is enabled.
    #[must_use]
    pub fn access_list(&self) -> Vec<(Address, Vec<StorageKey>)> {
        self.report
            .as_ref()
            .map(|report| {
                report
                    .iter()
                    .map(|(address, keys)| (*address, keys.iter().copied().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// =============================================================================
// TESTS
// =============================================================================
