//! # In-Memory State Backend
//!
//! `StateBackend` implementation over plain maps, used by tests, benches
//! and embedders that keep world state in memory.
//! A production host would back the same trait with its trie.

use crate::domain::entities::{Account, EMPTY_CODE_HASH};
use crate::domain::services::keccak256;
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::StateError;
use crate::ports::outbound::StateBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory world state.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    accounts: RwLock<HashMap<Address, Account>>,
    code: RwLock<HashMap<Hash, Bytes>>,
    storage: RwLock<HashMap<Address, HashMap<StorageKey, StorageValue>>>,
}

impl InMemoryBackend {
    /// Create a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account record.
    pub async fn insert_account(&self, address: Address, account: Account) {
        self.accounts.write().await.insert(address, account);
    }

    /// Seed a balance, creating the account if needed.
    pub async fn insert_balance(&self, address: Address, balance: U256) {
        let mut accounts = self.accounts.write().await;
        accounts.entry(address).or_default().balance = balance;
    }

    /// Seed contract code and point the account's code hash at it.
    pub async fn insert_code(&self, address: Address, code: &[u8]) {
        let code_hash = if code.is_empty() {
            EMPTY_CODE_HASH
        } else {
            keccak256(code)
        };
        self.accounts
            .write()
            .await
            .entry(address)
            .or_default()
            .code_hash = code_hash;
        self.code
            .write()
            .await
            .insert(code_hash, Bytes::from_slice(code));
    }

    /// Seed a storage slot.
    pub async fn insert_storage(&self, address: Address, key: StorageKey, value: StorageValue) {
        self.storage
            .write()
            .await
            .entry(address)
            .or_default()
            .insert(key, value);
    }

    /// Current account record, if any.
    pub async fn account(&self, address: Address) -> Option<Account> {
        self.accounts.read().await.get(&address).copied()
    }

    /// Current slot value, zero if absent.
    pub async fn storage_value(&self, address: Address, key: StorageKey) -> StorageValue {
        self.storage
            .read()
            .await
            .get(&address)
            .and_then(|slots| slots.get(&key))
            .copied()
            .unwrap_or(StorageValue::ZERO)
    }

    /// Code of an account, empty for an EOA or unknown account.
    pub async fn code_of(&self, address: Address) -> Bytes {
        let Some(account) = self.account(address).await else {
            return Bytes::new();
        };
        self.code
            .read()
            .await
            .get(&account.code_hash)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of non-zero slots held for an account.
    pub async fn slot_count(&self, address: Address) -> usize {
        self.storage
            .read()
            .await
            .get(&address)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl StateBackend for InMemoryBackend {
    async fn get_account(&self, address: Address) -> Result<Option<Account>, StateError> {
        Ok(self.accounts.read().await.get(&address).copied())
    }

    async fn put_account(&self, address: Address, account: Account) -> Result<(), StateError> {
        self.accounts.write().await.insert(address, account);
        Ok(())
    }

    async fn delete_account(&self, address: Address) -> Result<(), StateError> {
        self.accounts.write().await.remove(&address);
        self.storage.write().await.remove(&address);
        Ok(())
    }

    async fn get_storage(
        &self,
        address: Address,
        key: StorageKey,
    ) -> Result<StorageValue, StateError> {
        Ok(self.storage_value(address, key).await)
    }

    async fn put_storage(
        &self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), StateError> {
        self.insert_storage(address, key, value).await;
        Ok(())
    }

    async fn delete_storage(&self, address: Address, key: StorageKey) -> Result<(), StateError> {
        if let Some(slots) = self.storage.write().await.get_mut(&address) {
            slots.remove(&key);
        }
        Ok(())
    }

    async fn clear_storage(&self, address: Address) -> Result<(), StateError> {
        self.storage.write().await.remove(&address);
        Ok(())
    }

    async fn get_code(&self, code_hash: Hash) -> Result<Option<Bytes>, StateError> {
        Ok(self.code.read().await.get(&code_hash).cloned())
    }

    async fn put_code(&self, code_hash: Hash, code: Bytes) -> Result<(), StateError> {
        self.code.write().await.insert(code_hash, code);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
