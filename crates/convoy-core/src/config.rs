//! The immutable build configuration shared by a deployment run.
//!
//! A [`BuildConfig`] is assembled once per orchestration run from resolved
//! parameters and never mutated afterwards. Every deployable unit reads it
//! concurrently, so all collections are ordered (`BTreeMap`) to keep
//! serialization and fingerprints stable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A cloud region name (e.g. `ap-southeast-1`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Creates a new region.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the region name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Region {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Region {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One deployable account/region pair.
///
/// Every deployable unit is scoped to exactly one target; the logical slot
/// name it is declared with (e.g. `backend`, `frontend`) is resolved to a
/// target through [`BuildConfig::account`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTarget {
    /// Account identifier.
    pub account: String,
    /// Region the unit deploys into.
    pub region: Region,
}

impl AccountTarget {
    /// Creates a new account target.
    #[must_use]
    pub fn new(account: impl Into<String>, region: impl Into<Region>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for AccountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.region)
    }
}

/// What happens to stateful resources when a unit is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalPolicy {
    /// Delete resources on removal.
    Destroy,
    /// Keep resources on removal.
    Retain,
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        Self::Retain
    }
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destroy => write!(f, "DESTROY"),
            Self::Retain => write!(f, "RETAIN"),
        }
    }
}

/// The typed build configuration for one orchestration run.
///
/// Maps logical account slots to concrete account/region targets and carries
/// external resource identifiers (certificate ARNs, secret ARNs, ...) that
/// units reference but no unit produces.
///
/// Immutable once built: construction happens through
/// `convoy_params::ConfigBuilder`, and the orchestrator shares the result
/// read-only across every unit in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Deployment stage name (e.g. `production`).
    pub stage: String,
    /// Logical slot name to account/region target.
    pub accounts: BTreeMap<String, AccountTarget>,
    /// External resource identifiers by name.
    pub external_parameters: BTreeMap<String, String>,
    /// Policy applied to stateful resources in this stage.
    pub removal_policy: RemovalPolicy,
}

impl BuildConfig {
    /// Returns the account target for a logical slot, if declared.
    #[must_use]
    pub fn account(&self, slot: &str) -> Option<&AccountTarget> {
        self.accounts.get(slot)
    }

    /// Returns an external parameter value by name, if declared.
    #[must_use]
    pub fn external(&self, name: &str) -> Option<&str> {
        self.external_parameters.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildConfig {
        let mut accounts = BTreeMap::new();
        accounts.insert(
            "backend".to_string(),
            AccountTarget::new("111122223333", "ap-southeast-1"),
        );
        let mut external = BTreeMap::new();
        external.insert(
            "wildcardDomainCertificateArn".to_string(),
            "arn:aws:acm:ap-southeast-1:999988887777:certificate/abc".to_string(),
        );
        BuildConfig {
            stage: "production".to_string(),
            accounts,
            external_parameters: external,
            removal_policy: RemovalPolicy::Retain,
        }
    }

    #[test]
    fn account_lookup_by_slot() {
        let config = sample();
        assert_eq!(config.account("backend").unwrap().account, "111122223333");
        assert!(config.account("frontend").is_none());
    }

    #[test]
    fn external_lookup_by_name() {
        let config = sample();
        assert!(
            config
                .external("wildcardDomainCertificateArn")
                .unwrap()
                .starts_with("arn:aws:acm")
        );
        assert!(config.external("missing").is_none());
    }

    #[test]
    fn serializes_with_stable_key_order() {
        let config = sample();
        let a = serde_json::to_string(&config).unwrap();
        let b = serde_json::to_string(&config.clone()).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("\"removalPolicy\":\"RETAIN\""));
    }
}
