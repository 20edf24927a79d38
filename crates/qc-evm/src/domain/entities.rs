//! # Core Domain Entities
//!
//! Accounts, call messages, execution context and results.

use crate::domain::value_objects::{Address, Bytes, Hash, U256};
use crate::errors::VmError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Self-destructed address mapped to the beneficiary of its balance.
pub type SelfDestructSet = BTreeMap<Address, Address>;

// =============================================================================
// ACCOUNT
// =============================================================================

/// Keccak-256 of the empty byte string.
pub const EMPTY_CODE_HASH: Hash = Hash([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
]);

/// Root of an empty storage trie.
pub const EMPTY_STORAGE_ROOT: Hash = Hash([
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
]);

/// World-state account record.
///
/// Opcode handlers never mutate an `Account` in place; they read a copy from
/// the state manager and write the updated value back through it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Transaction / creation counter.
    pub nonce: u64,
    /// Balance in wei.
    pub balance: U256,
    /// Keccak-256 of the account's code.
    pub code_hash: Hash,
    /// Opaque reference into the storage trie collaborator.
    pub storage_root: Hash,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            code_hash: EMPTY_CODE_HASH,
            storage_root: EMPTY_STORAGE_ROOT,
        }
    }
}

impl Account {
    /// Creates a code-less account.
    #[must_use]
    pub fn new(nonce: u64, balance: U256) -> Self {
        Self {
            nonce,
            balance,
            ..Self::default()
        }
    }

    /// Returns true if the account carries code.
    #[must_use]
    pub fn is_contract(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }

    /// EIP-161 emptiness: zero nonce, zero balance, no code.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == EMPTY_CODE_HASH
    }
}

// =============================================================================
// BLOCK & TRANSACTION CONTEXT
// =============================================================================

/// Read-only block context consumed by the environment opcodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockContext {
    /// Block number.
    pub number: u64,
    /// Block timestamp (unix seconds).
    pub timestamp: u64,
    /// Coinbase address (block proposer).
    pub coinbase: Address,
    /// Proof-of-work difficulty.
    pub difficulty: U256,
    /// Beacon randomness, returned by DIFFICULTY once EIP-4399 is active.
    pub prev_randao: Hash,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Base fee (EIP-1559).
    pub base_fee: U256,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            number: 0,
            timestamp: 0,
            coinbase: Address::ZERO,
            difficulty: U256::zero(),
            prev_randao: Hash::ZERO,
            gas_limit: 30_000_000,
            base_fee: U256::zero(),
        }
    }
}

/// Per-transaction context shared by every frame.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TxContext {
    /// Externally-owned account that signed the transaction.
    pub origin: Address,
    /// Effective gas price.
    pub gas_price: U256,
}

// =============================================================================
// MESSAGE
// =============================================================================

/// One call or create invocation.
///
/// Built once per frame and consumed by exactly one orchestrator run.
/// A message without `to` is a contract creation; its `data` is the init code.
#[derive(Clone, Debug, Default)]
pub struct Message {
    /// Call target; `None` for CREATE/CREATE2.
    pub to: Option<Address>,
    /// Value transferred with the message.
    pub value: U256,
    /// Sender of the message.
    pub caller: Address,
    /// Gas forwarded to the frame.
    pub gas_limit: u64,
    /// Calldata, or init code for a creation.
    pub data: Bytes,
    /// Call depth, 0 for the transaction itself.
    pub depth: usize,
    /// Explicit code to run instead of the target's stored code.
    pub code: Option<Bytes>,
    /// Address whose code runs; differs from `to` for CALLCODE/DELEGATECALL.
    pub code_address: Option<Address>,
    /// True inside STATICCALL.
    pub is_static: bool,
    /// Set when `code_address` resolved to a precompile.
    pub is_compiled: bool,
    /// CREATE2 salt.
    pub salt: Option<Hash>,
    /// Self-destructs inherited from the parent frame.
    pub selfdestruct: SelfDestructSet,
    /// True for DELEGATECALL (no value movement).
    pub delegatecall: bool,
    /// Refund counter at frame entry.
    pub gas_refund: u64,
}

impl Message {
    /// Address whose code the frame runs.
    #[must_use]
    pub fn code_address(&self) -> Address {
        self.code_address
            .or(self.to)
            .unwrap_or(Address::ZERO)
    }

    /// Returns true for CREATE/CREATE2 messages.
    #[must_use]
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Emitted log (event) from contract execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Contract address that emitted the log.
    pub address: Address,
    /// Indexed topics (up to 4).
    pub topics: Vec<Hash>,
    /// Non-indexed data.
    pub data: Bytes,
}

/// Outcome of running one frame's code (or precompile).
#[derive(Clone, Debug, Default)]
pub struct ExecResult {
    /// Gas consumed by the frame, including burned gas on a trap.
    pub execution_gas_used: u64,
    /// Gas remaining when the frame halted.
    pub gas_left: u64,
    /// RETURN / REVERT payload.
    pub return_value: Bytes,
    /// Trap that ended the frame, if any.
    pub exception_error: Option<VmError>,
    /// Logs emitted by the frame and its committed children.
    pub logs: Vec<Log>,
    /// Self-destructs accumulated by the frame and its committed children.
    pub selfdestruct: SelfDestructSet,
    /// Refund counter when the frame halted.
    pub gas_refund: u64,
}

impl ExecResult {
    /// A trap result that burns the whole limit.
    #[must_use]
    pub fn trap(error: VmError, gas_limit: u64) -> Self {
        Self {
            execution_gas_used: gas_limit,
            exception_error: Some(error),
            ..Self::default()
        }
    }

    /// Returns true if the frame halted without a trap.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exception_error.is_none()
    }

    /// Decodes a Solidity `Error(string)` payload from REVERT data.
    #[must_use]
    pub fn revert_reason(&self) -> Option<String> {
        if self.exception_error != Some(VmError::Revert) {
            return None;
        }
        let data = self.return_value.as_slice();
        if data.len() < 68 || data[..4] != [0x08, 0xc3, 0x79, 0xa0] {
            return None;
        }
        let len_word = U256::from_big_endian(&data[36..68]);
        if len_word > U256::from(data.len()) {
            return None;
        }
        let len = len_word.as_usize();
        let body = data.get(68..68 + len)?;
        String::from_utf8(body.to_vec()).ok()
    }
}

/// Result of one orchestrator invocation.
#[derive(Clone, Debug, Default)]
pub struct EvmResult {
    /// Address of the created contract (create path only).
    pub created_address: Option<Address>,
    /// Frame outcome.
    pub exec: ExecResult,
}

impl EvmResult {
    /// Refund granted after applying the cap `gas_used / quotient`.
    ///
    /// The quotient is 2 before EIP-3529 and 5 after.
    #[must_use]
    pub fn capped_refund(&self, quotient: u64) -> u64 {
        let cap = self.exec.execution_gas_used / quotient.max(1);
        self.exec.gas_refund.min(cap)
    }
}
