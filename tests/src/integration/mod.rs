//! # Integration Tests
//!
//! Every test drives a real `Evm` over `InMemoryBackend` and inspects the
//! backend afterwards, so only state that was actually flushed is observed.

pub mod fixtures;

mod call_value;
mod checkpoints;
mod create;
mod scenarios;
mod sstore;
mod static_ctx;
