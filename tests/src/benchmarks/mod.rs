//! # QC-EVM Benchmarks
//!
//! Bytecode workloads and the benchmark groups that drive them. The
//! `benches/evm_benchmarks.rs` harness registers these groups.

pub mod interpreter;
pub mod workloads;
