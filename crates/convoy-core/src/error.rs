//! Error types and result aliases for Convoy.
//!
//! This module defines the shared error types used across all Convoy
//! components. Errors are structured for programmatic handling and include
//! context for debugging.

/// The result type used throughout Convoy.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core Convoy operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<crate::canonical_json::CanonicalJsonError> for Error {
    fn from(err: crate::canonical_json::CanonicalJsonError) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
