//! Parameter resolution with optional cross-account identity.
//!
//! The resolver is the single entry point for fetching configuration values.
//! One call resolves one batch of paths under one identity: either the
//! ambient identity, or session credentials obtained through a
//! role-assumption exchange performed at the start of the call. There is no
//! process-wide credential state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;

use crate::credentials::{session_name, CredentialExchange, SessionCredentials};
use crate::error::{Error, Result};
use crate::store::ParameterStore;

/// Resolves named configuration values from a remote parameter store.
pub struct ParameterResolver<S, X> {
    store: S,
    exchange: X,
}

impl<S, X> ParameterResolver<S, X>
where
    S: ParameterStore,
    X: CredentialExchange,
{
    /// Creates a new resolver over a store and a credential exchange.
    #[must_use]
    pub fn new(store: S, exchange: X) -> Self {
        Self { store, exchange }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolves every requested path, failing fast on any gap.
    ///
    /// When `assume_role_arn` is `Some`, a role-assumption exchange runs
    /// first with a timestamp-based session name; all lookups in this call
    /// then use the exchanged credentials. An exchange failure aborts the
    /// whole resolution; there is no fallback to the ambient identity.
    ///
    /// # Errors
    ///
    /// - [`Error::CredentialExchange`] if the exchange fails
    /// - [`Error::Store`] if the store call itself fails
    /// - [`Error::MissingParameters`] listing every requested path the
    ///   store had no value for (aggregated, not first-failure)
    #[tracing::instrument(skip(self, paths), fields(path_count = paths.len()))]
    pub async fn resolve(
        &self,
        paths: &BTreeSet<String>,
        assume_role_arn: Option<&str>,
    ) -> Result<BTreeMap<String, String>> {
        let credentials = match assume_role_arn {
            Some(role_arn) => Some(self.exchange_credentials(role_arn).await?),
            None => {
                tracing::info!(identity = "ambient", "resolving parameters");
                None
            }
        };

        let resolved = self
            .store
            .get_parameters(paths, credentials.as_ref())
            .await?;

        let missing: Vec<String> = paths
            .iter()
            .filter(|path| !resolved.contains_key(*path))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(Error::MissingParameters { paths: missing });
        }

        Ok(resolved)
    }

    async fn exchange_credentials(&self, role_arn: &str) -> Result<SessionCredentials> {
        let session = session_name(Utc::now());
        tracing::info!(
            identity = "assumed-role",
            role_arn,
            session = %session,
            "resolving parameters with cross-account credentials"
        );

        self.exchange
            .assume_role(role_arn, &session)
            .await
            .map_err(|message| Error::CredentialExchange {
                role_arn: role_arn.to_string(),
                message,
            })
    }
}
