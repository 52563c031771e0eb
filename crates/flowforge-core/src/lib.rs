//! Core types and abstractions for the Flowforge workflow template engine.
//!
//! This crate provides the foundational types, error handling, and request
//! shapes used across all Flowforge components.

pub mod error;
pub mod id;
pub mod principal;
pub mod requests;
pub mod types;

pub use error::{EntityKind, ForgeError, Result};
pub use id::ForgeId;
pub use principal::{Principal, Role};
pub use requests::*;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{EntityKind, ForgeError, Result};
    pub use crate::id::ForgeId;
    pub use crate::principal::{Principal, Role};
    pub use crate::requests::*;
    pub use crate::types::*;
}
