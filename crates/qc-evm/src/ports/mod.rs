//! # Ports Layer (Middle Hexagon)
//!
//! Trait definitions the engine depends on. The host drives the engine
//! directly through [`Evm`](crate::evm::engine::Evm); everything the engine
//! needs from the host goes through these traits.
//!
//! - **Driven Ports (Outbound)**: `StateBackend`, `BlockHashOracle`, `EvmObserver`
//! - No concrete implementations in this module

pub mod outbound;

pub use outbound::*;
