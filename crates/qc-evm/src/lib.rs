//! # QC-EVM - Embedded EVM Execution Engine
//!
//! A stack-based EVM interpreter with per-transaction, checkpointed world
//! state. The engine is embedded: the host supplies the backing store, block
//! hashes and (optionally) extra precompiles and opcodes, then drives
//! execution one message at a time.
//!
//! ## Layers
//!
//! | Layer | Location | Purpose |
//! |-------|----------|---------|
//! | Domain | `domain/` | Accounts, messages, results, value types |
//! | Config | `config.rs` | Hardforks, extra EIPs, resolved gas schedule |
//! | State | `state/` | Diff-per-checkpoint caches, access list tracking |
//! | EVM | `evm/` | Stack, memory, gas, interpreter, EEI, orchestrator, precompiles |
//! | Ports | `ports/` | Backing store, block hash oracle, observer hooks |
//! | Adapters | `adapters/` | In-memory backing store |
//!
//! ## Execution Guarantees
//!
//! | Guarantee | Enforcement |
//! |-----------|-------------|
//! | Gas never goes negative | `Interpreter::use_gas` clamps to zero and traps |
//! | A failed frame leaves no state behind | `Evm::execute_message` reverts its checkpoint |
//! | Static frames cannot write | dynamic gas pass traps `StaticStateChange` |
//! | Call depth is bounded | EEI pushes 0 at `max_call_depth` |
//! | Backing store sees only committed writes | flush at checkpoint depth zero |
//!
//! ## Usage Example
//!
//! ```ignore
//! use qc_evm::prelude::*;
//! use std::sync::Arc;
//!
//! let backend = Arc::new(InMemoryBackend::new());
//! let mut evm = Evm::new(VmConfig::for_hardfork(Hardfork::Shanghai), backend)?;
//!
//! let result = evm
//!     .run_call(RunCallOpts {
//!         caller,
//!         to: Some(contract),
//!         data: Bytes::from(calldata),
//!         ..RunCallOpts::default()
//!     })
//!     .await?;
//!
//! if result.exec.is_success() {
//!     tracing::info!(gas_used = result.exec.execution_gas_used, "call succeeded");
//! }
//! ```

// Crate-level lints
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::missing_errors_doc)]

// =============================================================================
// MODULES
// =============================================================================

pub mod adapters;
pub mod config;
pub mod domain;
pub mod errors;
pub mod evm;
pub mod ports;
pub mod state;

// =============================================================================
// PRELUDE
// =============================================================================

/// Convenient re-exports for common usage.
pub mod prelude {
    // Configuration
    pub use crate::config::{GasSchedule, Hardfork, RuleSet, VmConfig};

    // Domain entities
    pub use crate::domain::entities::{
        Account, BlockContext, EvmResult, ExecResult, Log, Message, SelfDestructSet, TxContext,
    };

    // Value objects
    pub use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};

    // Domain services
    pub use crate::domain::services::{generate_address, generate_address2, keccak256};

    // Ports
    pub use crate::ports::outbound::{
        BlockHashOracle, EvmObserver, NoBlockHashes, StateBackend, StepEvent,
    };

    // Errors
    pub use crate::errors::{EvmError, PrecompileError, StateError, VmError};

    // EVM components
    pub use crate::evm::engine::{Evm, RunCallOpts, RunCodeOpts, DEFAULT_GAS_LIMIT};
    pub use crate::evm::opcodes::{CustomHandler, CustomOpcode, CustomStep, Opcode};
    pub use crate::evm::precompiles::{Precompile, PrecompileOutput, PrecompileRegistry};
    pub use crate::evm::{memory::Memory, stack::Stack};

    // State
    pub use crate::state::{AccessTracker, StateManager};

    // Adapters
    pub use crate::adapters::InMemoryBackend;
}

// =============================================================================
// CRATE INFO
// =============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// TESTS
// =============================================================================
