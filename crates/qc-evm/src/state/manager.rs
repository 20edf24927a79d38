//! # State Manager
//!
//! Read-through, checkpointed view of world state for one VM instance.
//!
//! All reads fill the caches from the [`StateBackend`] on a miss. Writes
//! only touch the caches; they reach the backend when the checkpoint depth
//! returns to zero (or on an explicit [`StateManager::flush`] at depth zero).

use super::account_cache::{AccountCache, CachedAccount};
use super::diff::CheckpointMap;
use super::storage_cache::StorageCache;
use super::CacheStats;
use crate::domain::entities::{Account, EMPTY_CODE_HASH};
use crate::domain::services::keccak256;
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue};
use crate::errors::StateError;
use crate::ports::outbound::StateBackend;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Checkpointed world state in front of a backend.
pub struct StateManager<B> {
    backend: Arc<B>,
    accounts: AccountCache,
    storage: StorageCache,
    code: CheckpointMap<Hash, Bytes>,
    touched: CheckpointMap<Address, ()>,
    original_storage: HashMap<(Address, StorageKey), StorageValue>,
}

impl<B: StateBackend> StateManager<B> {
    /// Creates a manager with empty caches.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            accounts: AccountCache::new(),
            storage: StorageCache::new(),
            code: CheckpointMap::new(),
            touched: CheckpointMap::new(),
            original_storage: HashMap::new(),
        }
    }

    /// The backing store.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    // =========================================================================
    // ACCOUNTS
    // =========================================================================

    /// Reads an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn get_account(&mut self, address: Address) -> Result<Option<Account>, StateError> {
        match self.accounts.get(&address) {
            CachedAccount::Present(account) => Ok(Some(account)),
            CachedAccount::Missing => Ok(None),
            CachedAccount::Unknown => {
                let account = self.backend.get_account(address).await?;
                self.accounts.fill(address, account);
                Ok(account)
            }
        }
    }

    /// Reads an account, defaulting to an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn get_account_or_default(&mut self, address: Address) -> Result<Account, StateError> {
        Ok(self.get_account(address).await?.unwrap_or_default())
    }

    /// Writes an account and marks it touched.
    pub fn put_account(&mut self, address: Address, account: Account) {
        self.accounts.put(address, account);
        self.touch_account(address);
    }

    /// Deletes an account together with its storage.
    pub fn delete_account(&mut self, address: Address) {
        self.accounts.delete(address);
        self.storage.clear_contract_storage(address);
        self.touch_account(address);
    }

    /// Applies `modify` to an account (created empty if missing) and writes it back.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn modify_account_fields<F>(
        &mut self,
        address: Address,
        modify: F,
    ) -> Result<Account, StateError>
    where
        F: FnOnce(&mut Account) + Send,
    {
        let mut account = self.get_account_or_default(address).await?;
        modify(&mut account);
        self.put_account(address, account);
        Ok(account)
    }

    /// Returns true if the account exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn account_exists(&mut self, address: Address) -> Result<bool, StateError> {
        Ok(self.get_account(address).await?.is_some())
    }

    /// Returns true if the account is missing or EIP-161 empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn account_is_empty(&mut self, address: Address) -> Result<bool, StateError> {
        Ok(self
            .get_account(address)
            .await?
            .map_or(true, |account| account.is_empty()))
    }

    // =========================================================================
    // CODE
    // =========================================================================

    /// Reads the code of an account. Missing accounts have no code.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the account's code hash has no code behind it.
    pub async fn get_contract_code(&mut self, address: Address) -> Result<Bytes, StateError> {
        let Some(account) = self.get_account(address).await? else {
            return Ok(Bytes::new());
        };
        if account.code_hash == EMPTY_CODE_HASH {
            return Ok(Bytes::new());
        }
        if let Some(code) = self.code.get(&account.code_hash) {
            return Ok(code.clone());
        }
        let code = self
            .backend
            .get_code(account.code_hash)
            .await?
            .ok_or(StateError::Corrupted(address))?;
        self.code.fill(account.code_hash, code.clone());
        Ok(code)
    }

    /// Stores code and points the account's code hash at it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn put_contract_code(&mut self, address: Address, code: Bytes) -> Result<(), StateError> {
        let code_hash = if code.is_empty() {
            EMPTY_CODE_HASH
        } else {
            keccak256(code.as_slice())
        };
        if !code.is_empty() {
            self.code.put(code_hash, code);
        }
        self.modify_account_fields(address, |account| account.code_hash = code_hash)
            .await?;
        Ok(())
    }

    // =========================================================================
    // STORAGE
    // =========================================================================

    /// Reads a storage slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn get_contract_storage(
        &mut self,
        address: Address,
        key: StorageKey,
    ) -> Result<StorageValue, StateError> {
        if let Some(value) = self.storage.get(&address, &key) {
            return Ok(value);
        }
        let value = self.backend.get_storage(address, key).await?;
        self.storage.fill(address, key, value);
        Ok(value)
    }

    /// Writes a storage slot; zero deletes it.
    pub fn put_contract_storage(&mut self, address: Address, key: StorageKey, value: StorageValue) {
        if value.is_zero() {
            self.storage.delete(address, key);
        } else {
            self.storage.put(address, key, value);
        }
    }

    /// Wipes every storage slot of an account.
    pub fn clear_contract_storage(&mut self, address: Address) {
        self.storage.clear_contract_storage(address);
    }

    /// Value of a slot at the start of the transaction.
    ///
    /// Cached until the next flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn get_original_contract_storage(
        &mut self,
        address: Address,
        key: StorageKey,
    ) -> Result<StorageValue, StateError> {
        if let Some(value) = self.original_storage.get(&(address, key)) {
            return Ok(*value);
        }
        let value = if self.storage.is_cleared(&address) {
            StorageValue::ZERO
        } else {
            self.backend.get_storage(address, key).await?
        };
        self.original_storage.insert((address, key), value);
        Ok(value)
    }

    // =========================================================================
    // TOUCHED ACCOUNTS (EIP-161)
    // =========================================================================

    /// Marks an account touched.
    pub fn touch_account(&mut self, address: Address) {
        self.touched.put(address, ());
    }

    /// Deletes every touched account that is empty, then forgets the touches.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn cleanup_touched_accounts(&mut self) -> Result<(), StateError> {
        let mut touched: Vec<Address> = self.touched.iter().map(|(a, ())| *a).collect();
        touched.sort_unstable();
        for address in touched {
            if let Some(account) = self.get_account(address).await? {
                if account.is_empty() {
                    debug!(%address, "deleting empty touched account");
                    self.accounts.delete(address);
                    self.storage.clear_contract_storage(address);
                }
            }
        }
        self.touched.clear();
        Ok(())
    }

    /// Forgets the touched set without cleaning up.
    pub fn clear_touched(&mut self) {
        self.touched.clear();
    }

    // =========================================================================
    // CHECKPOINTS
    // =========================================================================

    /// Number of open checkpoints.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.accounts.depth()
    }

    /// Opens a checkpoint in every cache.
    pub fn checkpoint(&mut self) {
        self.accounts.checkpoint();
        self.storage.checkpoint();
        self.code.checkpoint();
        self.touched.checkpoint();
    }

    /// Keeps the writes of the top checkpoint; flushes at depth zero.
    ///
    /// # Errors
    ///
    /// Returns an error on an unpaired commit or a failed flush.
    pub async fn commit(&mut self) -> Result<(), StateError> {
        self.accounts.commit()?;
        self.storage.commit()?;
        self.code.commit()?;
        self.touched.commit()?;
        if self.depth() == 0 {
            self.flush().await?;
        }
        Ok(())
    }

    /// Discards the writes of the top checkpoint; flushes at depth zero.
    ///
    /// # Errors
    ///
    /// Returns an error on an unpaired revert or a failed flush.
    pub async fn revert(&mut self) -> Result<(), StateError> {
        self.accounts.revert()?;
        self.storage.revert()?;
        self.code.revert()?;
        self.touched.revert()?;
        if self.depth() == 0 {
            self.flush().await?;
        }
        Ok(())
    }

    /// Writes the net changes since the last flush to the backend.
    ///
    /// # Errors
    ///
    /// Returns `OpenCheckpoints` if a checkpoint is open, or the backend error.
    pub async fn flush(&mut self) -> Result<(), StateError> {
        let code = self.code.flush()?;
        let storage = self.storage.flush()?;
        let accounts = self.accounts.flush()?;

        debug!(
            accounts = accounts.len(),
            slots = storage.writes.len(),
            cleared = storage.cleared.len(),
            "flushing state caches"
        );

        for (hash, code) in code {
            if let Some(code) = code {
                self.backend.put_code(hash, code).await?;
            }
        }
        for address in storage.cleared {
            self.backend.clear_storage(address).await?;
        }
        for (address, key, value) in storage.writes {
            if value.is_zero() {
                self.backend.delete_storage(address, key).await?;
            } else {
                self.backend.put_storage(address, key, value).await?;
            }
        }
        for (address, account) in accounts {
            match account {
                Some(account) => self.backend.put_account(address, account).await?,
                None => self.backend.delete_account(address).await?,
            }
        }
        self.original_storage.clear();
        Ok(())
    }

    /// Drops every cache entry without writing anything.
    pub fn clear_caches(&mut self) {
        self.accounts.clear();
        self.storage.clear();
        self.code.clear();
        self.touched.clear();
        self.original_storage.clear();
    }

    /// Account cache statistics.
    #[must_use]
    pub fn account_stats(&self) -> CacheStats {
        self.accounts.stats()
    }

    /// Storage cache statistics.
    #[must_use]
    pub fn storage_stats(&self) -> CacheStats {
        self.storage.stats()
    }
}

// =============================================================================
// TESTS
// =============================================================================
