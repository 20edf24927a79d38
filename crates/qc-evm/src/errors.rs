//! # Error Types
//!
//! Machine traps, state failures, precompile failures and fatal host errors.
//!
//! | Type | Scope | Crosses a frame boundary? |
//! |------|-------|---------------------------|
//! | [`VmError`] | one call frame | no, carried in the frame's result |
//! | [`PrecompileError`] | one precompile invocation | no, converted to [`VmError`] |
//! | [`StateError`] | backing store and caches | yes, as [`EvmError::State`] |
//! | [`EvmError`] | the whole transaction | yes, returned as `Err` |

use crate::domain::value_objects::Address;
use thiserror::Error;

// =============================================================================
// MACHINE TRAPS
// =============================================================================

/// Traps that terminate the current call frame.
///
/// A trap never aborts the transaction. The orchestrator reverts the frame's
/// checkpoint and the parent sees a zero pushed to its stack.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmError {
    /// Gas ran out while metering or executing an opcode.
    #[error("out of gas")]
    OutOfGas,

    /// The code deposit fee could not be paid (pre-Homestead only).
    #[error("code store out of gas")]
    CodeStoreOutOfGas,

    /// Deployed code exceeds the code size ceiling.
    #[error("code size exceeds maximum")]
    CodeSizeExceedsMaximum,

    /// Pop, peek, swap or dup below the stack bottom.
    #[error("stack underflow")]
    StackUnderflow,

    /// Push beyond the stack height bound.
    #[error("stack overflow")]
    StackOverflow,

    /// JUMP/JUMPI target is not a JUMPDEST.
    #[error("invalid JUMP")]
    InvalidJump,

    /// Undefined opcode for the active rule-set, or the designated INVALID.
    #[error("invalid opcode")]
    InvalidOpcode,

    /// Value or offset does not fit the allowed range.
    #[error("value out of range")]
    OutOfRange,

    /// Deliberate REVERT; the frame's return data is preserved.
    #[error("revert")]
    Revert,

    /// State-changing opcode inside a static call.
    #[error("static state change")]
    StaticStateChange,

    /// CREATE target already has a nonce or code.
    #[error("create collision")]
    CreateCollision,

    /// Successful halt; never surfaced as an error.
    #[error("stop")]
    Stop,

    /// Refund counter would go negative.
    #[error("refund exhausted")]
    RefundExhausted,

    /// Balance addition overflowed 256 bits.
    #[error("value overflow")]
    ValueOverflow,

    /// Sender cannot cover the transferred value.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// BEGINSUB reached by normal control flow.
    #[error("invalid BEGINSUB")]
    InvalidBeginSub,

    /// RETURNSUB with an empty return stack.
    #[error("invalid RETURNSUB")]
    InvalidReturnSub,

    /// JUMPSUB target is not a BEGINSUB.
    #[error("invalid JUMPSUB")]
    InvalidJumpSub,

    /// Code starting with the reserved 0xEF byte.
    #[error("invalid bytecode deployed")]
    InvalidBytecodeResult,

    /// Malformed or unsupported EOF container.
    #[error("invalid EOF format")]
    InvalidEofFormat,

    /// Init code exceeds the EIP-3860 ceiling.
    #[error("initcode exceeds max initcode size")]
    InitCodeSizeViolation,

    /// Precompile input length is invalid.
    #[error("invalid input length")]
    InvalidInputLength,

    /// Curve point is not on the curve.
    #[error("point not on curve")]
    PointNotOnCurve,

    /// Precompile input is empty where data is required.
    #[error("input is empty")]
    InputEmpty,

    /// Field element is outside the base field.
    #[error("fp point not in field")]
    FpNotInField,
}

impl VmError {
    /// Returns true if the frame keeps the gas it did not meter.
    ///
    /// Every trap except `REVERT` (and the EOF format rejection) burns the
    /// whole forwarded gas limit.
    #[must_use]
    pub fn preserves_gas(&self) -> bool {
        matches!(self, Self::Revert | Self::InvalidEofFormat)
    }

    /// Returns true if the frame's return data stays visible to the parent.
    #[must_use]
    pub fn keeps_return_data(&self) -> bool {
        matches!(self, Self::Revert)
    }
}

// =============================================================================
// STATE ERRORS
// =============================================================================

/// Errors from the backing store or the checkpointed caches.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The backing store failed.
    #[error("backend failure: {0}")]
    Backend(String),

    /// Commit or revert without a matching checkpoint.
    #[error("checkpoint underflow: no open checkpoint to {0}")]
    CheckpointUnderflow(&'static str),

    /// Flush requested while checkpoints are still open.
    #[error("cannot flush with {0} open checkpoint(s)")]
    OpenCheckpoints(usize),

    /// Cached data is inconsistent with its own bookkeeping.
    #[error("state corruption detected at {0:?}")]
    Corrupted(Address),
}

// =============================================================================
// PRECOMPILE ERRORS
// =============================================================================

/// Errors raised by precompiled contracts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrecompileError {
    /// Gas limit below the precompile's cost.
    #[error("out of gas")]
    OutOfGas,

    /// Input is malformed for this precompile.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Input has the wrong size or an out-of-range flag (BLAKE2F).
    #[error("value out of range")]
    OutOfRange,

    /// Input length is invalid (BLS family).
    #[error("invalid input length")]
    InvalidInputLength,

    /// Point is not on the curve (BLS family).
    #[error("point not on curve")]
    PointNotOnCurve,

    /// Input is empty (BLS family).
    #[error("input is empty")]
    InputEmpty,

    /// Field element out of range (BLS family).
    #[error("fp point not in field")]
    FpNotInField,
}

impl From<PrecompileError> for VmError {
    fn from(err: PrecompileError) -> Self {
        match err {
            PrecompileError::InvalidInputLength => Self::InvalidInputLength,
            PrecompileError::PointNotOnCurve => Self::PointNotOnCurve,
            PrecompileError::InputEmpty => Self::InputEmpty,
            PrecompileError::FpNotInField => Self::FpNotInField,
            PrecompileError::OutOfRange => Self::OutOfRange,
            PrecompileError::OutOfGas | PrecompileError::InvalidInput(_) => Self::OutOfGas,
        }
    }
}

// =============================================================================
// FATAL ERRORS
// =============================================================================

/// Host-level failures that abort the whole transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvmError {
    /// State access failed.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// An invariant of the engine itself was violated.
    #[error("internal error: {0}")]
    Internal(String),

    /// The rule-set or VM configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Why an opcode handler stopped the step loop.
///
/// Traps end the frame; fatal errors unwind the whole transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fault {
    Trap(VmError),
    Fatal(EvmError),
}

impl From<VmError> for Fault {
    fn from(err: VmError) -> Self {
        Self::Trap(err)
    }
}

impl From<EvmError> for Fault {
    fn from(err: EvmError) -> Self {
        Self::Fatal(err)
    }
}

impl From<StateError> for Fault {
    fn from(err: StateError) -> Self {
        Self::Fatal(EvmError::State(err))
    }
}

impl From<PrecompileError> for Fault {
    fn from(err: PrecompileError) -> Self {
        Self::Trap(err.into())
    }
}
