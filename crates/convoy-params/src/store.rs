//! Parameter store lookup.
//!
//! The backing store is an external collaborator: Convoy only needs a
//! batched "give me these paths" call that may be issued under an explicit
//! credential override. Absent entries are simply missing from the returned
//! map; deciding whether that is fatal is the resolver's job.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::credentials::SessionCredentials;
use crate::error::Result;

/// Trait for remote parameter lookup.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Looks up every requested path in one batched request.
    ///
    /// Paths with no value in the store are absent from the returned map;
    /// they are not an error at this layer.
    ///
    /// When `credentials` is `Some`, the lookup must be issued with those
    /// session credentials instead of the ambient identity.
    ///
    /// # Errors
    ///
    /// Returns an error only for store-level failures (transport,
    /// permissions), never for missing values.
    async fn get_parameters(
        &self,
        paths: &BTreeSet<String>,
        credentials: Option<&SessionCredentials>,
    ) -> Result<BTreeMap<String, String>>;
}

/// Which identity an in-memory store observed on its last lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedIdentity {
    /// No lookup has happened yet.
    None,
    /// The lookup used the ambient/default identity.
    Ambient,
    /// The lookup used exchanged session credentials.
    Session,
}

impl Default for ObservedIdentity {
    fn default() -> Self {
        Self::None
    }
}

/// In-memory parameter store for tests and local development.
///
/// Records which identity was presented on the most recent lookup so tests
/// can assert the resolver's credential handling.
#[derive(Debug, Default)]
pub struct InMemoryParameterStore {
    values: BTreeMap<String, String>,
    observed: Mutex<ObservedIdentity>,
}

impl InMemoryParameterStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter value.
    #[must_use]
    pub fn with_parameter(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(path.into(), value.into());
        self
    }

    /// Returns the identity observed on the most recent lookup.
    #[must_use]
    pub fn observed_identity(&self) -> ObservedIdentity {
        *self.observed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ParameterStore for InMemoryParameterStore {
    async fn get_parameters(
        &self,
        paths: &BTreeSet<String>,
        credentials: Option<&SessionCredentials>,
    ) -> Result<BTreeMap<String, String>> {
        *self.observed.lock().unwrap_or_else(|e| e.into_inner()) = if credentials.is_some() {
            ObservedIdentity::Session
        } else {
            ObservedIdentity::Ambient
        };

        Ok(paths
            .iter()
            .filter_map(|path| {
                self.values
                    .get(path)
                    .map(|value| (path.clone(), value.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn returns_only_known_paths() {
        let store = InMemoryParameterStore::new()
            .with_parameter("/account/sso/frontend", "111122223333");

        let result = store
            .get_parameters(&paths(&["/account/sso/frontend", "/missing"]), None)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result["/account/sso/frontend"], "111122223333");
    }

    #[tokio::test]
    async fn records_observed_identity() {
        let store = InMemoryParameterStore::new().with_parameter("/a", "1");
        assert_eq!(store.observed_identity(), ObservedIdentity::None);

        store.get_parameters(&paths(&["/a"]), None).await.unwrap();
        assert_eq!(store.observed_identity(), ObservedIdentity::Ambient);

        let creds = SessionCredentials {
            access_key_id: "AKIA".into(),
            secret_access_key: "s".into(),
            session_token: "t".into(),
            expires_at: None,
        };
        store
            .get_parameters(&paths(&["/a"]), Some(&creds))
            .await
            .unwrap();
        assert_eq!(store.observed_identity(), ObservedIdentity::Session);
    }
}
