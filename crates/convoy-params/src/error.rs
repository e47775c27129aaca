//! Error types for the configuration-resolution domain.

/// The result type used throughout convoy-params.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cross-account credential exchange failed.
    ///
    /// Fatal to the whole resolution pass: there is no fallback to the
    /// ambient identity once a role ARN was requested.
    #[error("credential exchange for role {role_arn} failed: {message}")]
    CredentialExchange {
        /// The role ARN the exchange was attempted against.
        role_arn: String,
        /// Description of the exchange failure.
        message: String,
    },

    /// One or more required parameter paths had no value in the store.
    ///
    /// All missing paths are aggregated so an operator sees the complete
    /// list of unset parameters in one pass.
    #[error("missing parameters: {}", paths.join(", "))]
    MissingParameters {
        /// Every requested path with no value, sorted.
        paths: Vec<String>,
    },

    /// A declared configuration slot referenced a path that was never
    /// resolved.
    ///
    /// This is a declaration/shape mismatch (a programming error), distinct
    /// from [`Error::MissingParameters`], which is raised earlier when the
    /// store itself has no value.
    #[error("config slot '{slot}' references unresolved path '{path}'")]
    ConfigShape {
        /// The logical slot or external name with the bad declaration.
        slot: String,
        /// The parameter path the slot is sourced from.
        path: String,
    },

    /// The parameter store itself failed (transport, permissions, ...).
    #[error("parameter store error: {message}")]
    Store {
        /// Description of the store failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new store error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new store error with a source.
    #[must_use]
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
