//! # QC-EVM Test Suite
//!
//! Unified test crate for the embedded EVM.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── benchmarks/       # Interpreter workloads shared with benches/
//! │
//! └── integration/      # Whole-engine behaviour over the in-memory backend
//!     ├── fixtures.rs   # Accounts, bytecode helpers, fee arithmetic
//!     ├── scenarios.rs  # Deploy-and-call, reverted inner call, repeated SELFDESTRUCT
//!     ├── checkpoints.rs
//!     ├── sstore.rs
//!     ├── create.rs
//!     └── call_value.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p qc-tests
//!
//! # By category
//! cargo test -p qc-tests integration::scenarios
//! cargo test -p qc-tests integration::checkpoints
//!
//! # With engine traces
//! RUST_LOG=qc_evm=trace cargo test -p qc-tests -- --nocapture
//!
//! # Benchmarks
//! cargo bench -p qc-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod benchmarks;
pub mod integration;
