//! # convoy-params
//!
//! Configuration resolution for the Convoy deployment orchestrator.
//!
//! This crate implements the configuration-resolution protocol:
//!
//! - **Parameter lookup**: Named values fetched from a remote, versioned
//!   parameter store through the [`store::ParameterStore`] trait
//! - **Cross-account identity**: An optional role-assumption exchange
//!   ([`credentials::CredentialExchange`]) producing short-lived session
//!   credentials for lookups against another account
//! - **Fail-fast validation**: Every required path must resolve; missing
//!   paths are aggregated into a single error so an operator sees the
//!   complete list in one pass
//! - **Typed configuration**: [`builder::ConfigBuilder`] maps flat parameter
//!   paths into the immutable `BuildConfig` shared by a run
//!
//! ## Guarantees
//!
//! - No partial configuration ever leaves this crate: resolution and
//!   building either fully succeed or fail with full context
//! - Session credentials are held only for the duration of one resolution
//!   pass and are never serialized
//! - Building is deterministic: the same resolved map always produces the
//!   same `BuildConfig`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod builder;
pub mod credentials;
pub mod error;
pub mod resolver;
pub mod store;

pub use builder::{ConfigBuilder, ExternalSpec, SlotSpec};
pub use credentials::{CredentialExchange, FailingExchange, SessionCredentials, StaticExchange};
pub use error::{Error, Result};
pub use resolver::ParameterResolver;
pub use store::ParameterStore;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::builder::{ConfigBuilder, ExternalSpec, SlotSpec};
    pub use crate::credentials::{CredentialExchange, SessionCredentials};
    pub use crate::error::{Error, Result};
    pub use crate::resolver::ParameterResolver;
    pub use crate::store::{InMemoryParameterStore, ParameterStore};
}
