//! # Driven Ports (SPI - Outbound)
//!
//! Interfaces the engine depends on. Host adapters implement these traits
//! to provide:
//! - World state persistence (the trie collaborator)
//! - Historical block hashes (BLOCKHASH)
//! - Execution observation (message and step hooks)
//!
//! Dependencies point inward: the engine only ever sees these traits.

use crate::domain::entities::{Account, EvmResult, Message};
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::StateError;
use async_trait::async_trait;

// =============================================================================
// BACKING STORE
// =============================================================================

/// Opaque key-value world state consumed by the caches.
///
/// Reads happen on cache misses; writes only happen when the state manager
/// flushes at checkpoint depth zero. Every method is awaited to completion
/// before execution continues.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Get an account record.
    ///
    /// # Returns
    ///
    /// * `Some(Account)` - If the account exists
    /// * `None` - If it has never been created or was deleted
    async fn get_account(&self, address: Address) -> Result<Option<Account>, StateError>;

    /// Store an account record.
    async fn put_account(&self, address: Address, account: Account) -> Result<(), StateError>;

    /// Delete an account record together with its storage.
    async fn delete_account(&self, address: Address) -> Result<(), StateError>;

    /// Get a storage slot. Slots never written read as zero.
    async fn get_storage(
        &self,
        address: Address,
        key: StorageKey,
    ) -> Result<StorageValue, StateError>;

    /// Store a non-zero storage slot.
    async fn put_storage(
        &self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), StateError>;

    /// Delete a storage slot.
    async fn delete_storage(&self, address: Address, key: StorageKey) -> Result<(), StateError>;

    /// Delete every storage slot of an account.
    async fn clear_storage(&self, address: Address) -> Result<(), StateError>;

    /// Get code by its Keccak-256 hash.
    async fn get_code(&self, code_hash: Hash) -> Result<Option<Bytes>, StateError>;

    /// Store code under its Keccak-256 hash.
    async fn put_code(&self, code_hash: Hash, code: Bytes) -> Result<(), StateError>;
}

// =============================================================================
// BLOCK HASH ORACLE (For BLOCKHASH opcode)
// =============================================================================

/// Interface for querying historical block hashes.
///
/// The engine only asks for the 256 blocks preceding the current one and
/// pushes zero for anything else without consulting the oracle.
#[async_trait]
pub trait BlockHashOracle: Send + Sync {
    /// Get block hash for a given block number.
    ///
    /// * `Some(Hash)` - Block hash if known
    /// * `None` - If the block is unknown (pushed as zero)
    async fn get_block_hash(&self, number: u64) -> Option<Hash>;
}

/// Oracle that knows no block hashes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBlockHashes;

#[async_trait]
impl BlockHashOracle for NoBlockHashes {
    async fn get_block_hash(&self, _number: u64) -> Option<Hash> {
        None
    }
}

// =============================================================================
// OBSERVER (message and step hooks)
// =============================================================================

/// Snapshot of the machine taken before an opcode executes.
#[derive(Clone, Debug)]
pub struct StepEvent<'a> {
    /// Program counter of the opcode.
    pub pc: usize,
    /// Raw opcode byte.
    pub opcode: u8,
    /// Mnemonic from the active dispatch table.
    pub name: &'static str,
    /// Total fee charged for this step (static plus dynamic).
    pub fee: u64,
    /// Gas remaining before the fee is deducted.
    pub gas_left: u64,
    /// Call depth of the frame.
    pub depth: usize,
    /// Executing contract.
    pub address: Address,
    /// Stack, bottom first.
    pub stack: &'a [U256],
    /// Memory size in bytes.
    pub memory_size: usize,
}

/// Execution hooks. Every method defaults to a no-op.
pub trait EvmObserver: Send + Sync {
    /// Called before a message is dispatched.
    fn before_message(&self, _message: &Message) {}

    /// Called after a message finishes, whether it committed or reverted.
    fn after_message(&self, _result: &EvmResult) {}

    /// Called when a creation has derived its address, before init code runs.
    fn new_contract(&self, _address: Address, _init_code: &[u8]) {}

    /// Called before each opcode runs.
    fn step(&self, _event: &StepEvent<'_>) {}
}

// =============================================================================
// TESTS
// =============================================================================
