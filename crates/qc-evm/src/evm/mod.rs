//! # EVM Implementation
//!
//! The machine itself and the orchestration around it.
//!
//! ## Components
//!
//! - `engine.rs` - `Evm`: message lifecycle, call and create paths, entry points
//! - `interpreter.rs` - per-frame fetch-decode-execute loop and opcode handlers
//! - `eei.rs` - host operations reached from opcodes (nested calls, balances, logs)
//! - `gas.rs` - dynamic fees and the SSTORE rule generations
//! - `opcodes.rs` - opcode constants and the dispatch table
//! - `memory.rs` - byte-addressable frame memory
//! - `stack.rs` - bounded 256-bit stack
//! - `eof.rs` - EOF container checks (EIP-3540/3670)
//! - `transient.rs` - transient storage (EIP-1153)
//! - `precompiles/` - precompiled contracts and their registry

pub mod eei;
pub mod engine;
pub mod eof;
pub mod gas;
pub mod interpreter;
pub mod memory;
pub mod opcodes;
pub mod precompiles;
pub mod stack;
pub mod transient;

pub use eei::CallKind;
pub use engine::{Evm, RunCallOpts, RunCodeOpts, DEFAULT_GAS_LIMIT};
pub use interpreter::{Env, InterpreterResult};
pub use memory::Memory;
pub use opcodes::{CustomOpcode, Opcode, OpcodeInfo, OpcodeTable};
pub use stack::Stack;
pub use transient::TransientStorage;
