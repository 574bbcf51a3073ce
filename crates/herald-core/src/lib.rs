//! # Herald Core
//!
//! Core types, identifiers, and error definitions shared by the Herald
//! crates: the workspace-wide error type, typed job identifiers, and
//! tracing initialisation.

pub mod error;
pub mod id;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use id::*;
pub use result::*;

// Re-export shaku for dependency injection
pub use shaku::Interface;
