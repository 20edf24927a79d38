//! # Adapters Layer (Outer Hexagon)
//!
//! Concrete implementations of the driven ports.
//!
//! - `state_adapter.rs` - `InMemoryBackend`, a map-backed `StateBackend`

pub mod state_adapter;

pub use state_adapter::*;
