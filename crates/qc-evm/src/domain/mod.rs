//! # Domain Layer
//!
//! Pure value types and functions shared by the interpreter, the
//! orchestrator and the state caches. No I/O and no async code.

pub mod entities;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use services::*;
pub use value_objects::*;
