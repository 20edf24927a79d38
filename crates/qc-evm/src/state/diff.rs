//! # Checkpointed Diff Map
//!
//! The checkpoint primitive behind every transaction-scoped cache.
//!
//! A `CheckpointMap` keeps one live view plus a stack of diff frames. The
//! bottom frame collects every key written since the last flush; each
//! checkpoint pushes another frame on top.
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `put` / `remove` | capture the key's pre-write value in the top frame (first write only), then mutate the live view |
//! | `checkpoint` | push an empty frame |
//! | `revert` | pop the top frame, restore every captured value, drop keys that did not exist |
//! | `commit` | pop the top frame, merge its captures into the frame below where that frame has no entry |
//! | `flush` | return the live value of every key in the bottom frame, then reset the bottom frame |
//!
//! The lower frame keeps its own capture on commit because it was taken
//! earlier and is the true "before" value for that frame.

use crate::errors::StateError;
use std::collections::HashMap;
use std::hash::Hash;

/// Pre-write capture: `None` means the key did not exist in the live view.
type Frame<K, V> = HashMap<K, Option<V>>;

/// Live map with a LIFO stack of diff frames.
#[derive(Clone, Debug)]
pub struct CheckpointMap<K, V> {
    live: HashMap<K, V>,
    frames: Vec<Frame<K, V>>,
}

impl<K, V> Default for CheckpointMap<K, V> {
    fn default() -> Self {
        Self {
            live: HashMap::new(),
            frames: vec![HashMap::new()],
        }
    }
}

impl<K, V> CheckpointMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty map with only the base frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open checkpoints.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Reads the live value.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.live.get(key)
    }

    /// Returns true if the live view holds `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.live.contains_key(key)
    }

    /// Writes `value`, recording the pre-write value first.
    pub fn put(&mut self, key: K, value: V) {
        self.capture(&key);
        self.live.insert(key, value);
    }

    /// Drops `key` from the live view, recording the pre-write value first.
    pub fn remove(&mut self, key: &K) {
        self.capture(key);
        self.live.remove(key);
    }

    /// Inserts a value read from the backing store.
    ///
    /// Read-through fills are not writes: they are not captured and do not
    /// show up in `flush`.
    pub fn fill(&mut self, key: K, value: V) {
        self.live.insert(key, value);
    }

    /// Returns true if `key` has been written since the last flush.
    #[must_use]
    pub fn is_dirty(&self, key: &K) -> bool {
        self.frames.iter().any(|frame| frame.contains_key(key))
    }

    /// Pushes a new diff frame.
    pub fn checkpoint(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Pops the top frame, keeping its writes.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointUnderflow` if no checkpoint is open.
    pub fn commit(&mut self) -> Result<(), StateError> {
        if self.frames.len() < 2 {
            return Err(StateError::CheckpointUnderflow("commit"));
        }
        let top = self.frames.pop().unwrap_or_default();
        if let Some(below) = self.frames.last_mut() {
            for (key, before) in top {
                below.entry(key).or_insert(before);
            }
        }
        Ok(())
    }

    /// Pops the top frame, undoing its writes.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointUnderflow` if no checkpoint is open.
    pub fn revert(&mut self) -> Result<(), StateError> {
        if self.frames.len() < 2 {
            return Err(StateError::CheckpointUnderflow("revert"));
        }
        let top = self.frames.pop().unwrap_or_default();
        for (key, before) in top {
            match before {
                Some(value) => {
                    self.live.insert(key, value);
                }
                None => {
                    self.live.remove(&key);
                }
            }
        }
        Ok(())
    }

    /// Drains the net changes since the last flush.
    ///
    /// Each entry carries the live value, or `None` if the key was removed.
    ///
    /// # Errors
    ///
    /// Returns `OpenCheckpoints` if any checkpoint is still open.
    pub fn flush(&mut self) -> Result<Vec<(K, Option<V>)>, StateError> {
        if self.depth() > 0 {
            return Err(StateError::OpenCheckpoints(self.depth()));
        }
        let base = std::mem::take(&mut self.frames[0]);
        Ok(base
            .into_keys()
            .map(|key| {
                let value = self.live.get(&key).cloned();
                (key, value)
            })
            .collect())
    }

    /// Drops every live value and every frame.
    pub fn clear(&mut self) {
        self.live.clear();
        self.frames.clear();
        self.frames.push(HashMap::new());
    }

    /// Iterates the live view.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.live.iter()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if the live view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn capture(&mut self, key: &K) {
        let before = self.live.get(key).cloned();
        if let Some(frame) = self.frames.last_mut() {
            frame.entry(key.clone()).or_insert(before);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
