//! # convoy-core
//!
//! Core abstractions for the Convoy deployment orchestrator.
//!
//! This crate provides the foundational types used across all Convoy
//! components:
//!
//! - **Identifiers**: Strongly-typed IDs for runs and plans
//! - **Build Configuration**: The immutable account/region topology shared
//!   by every deployable unit in a run
//! - **Error Types**: Shared error definitions and result types
//! - **Serialization Helpers**: Canonical encoding for deterministic
//!   fingerprints
//!
//! ## Crate Boundary
//!
//! `convoy-core` is the only crate allowed to define shared primitives.
//! The resolution protocol (`convoy-params`) and the orchestration domain
//! (`convoy-flow`) both build on the types defined here.
//!
//! ## Example
//!
//! ```rust
//! use convoy_core::prelude::*;
//!
//! let run_id = RunId::generate();
//! let target = AccountTarget::new("111122223333", "ap-southeast-1");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod canonical_json;
pub mod config;
pub mod error;
pub mod id;

pub use config::{AccountTarget, BuildConfig, Region, RemovalPolicy};
pub use error::{Error, Result};
pub use id::{PlanId, RunId};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use convoy_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::canonical_json::{to_canonical_bytes, to_canonical_string};
    pub use crate::config::{AccountTarget, BuildConfig, Region, RemovalPolicy};
    pub use crate::error::{Error, Result};
    pub use crate::id::{PlanId, RunId};
}
