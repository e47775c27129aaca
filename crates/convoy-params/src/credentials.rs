//! Cross-account credential exchange.
//!
//! Deploying into another account requires temporary, role-scoped
//! credentials instead of the caller's ambient identity. The exchange is an
//! external collaborator behind the [`CredentialExchange`] trait; the
//! resolver performs it at most once per resolution pass and drops the
//! credentials when the pass ends.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Temporary credentials returned by a role-assumption exchange.
///
/// Never persisted and never serialized: the type deliberately does not
/// implement `Serialize`, and `Debug` redacts the secret material.
#[derive(Clone)]
pub struct SessionCredentials {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token bound to the assumed role.
    pub session_token: String,
    /// When the issuing service expires these credentials, if reported.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionCredentials {
    /// Returns true if the credentials are expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Generates a session name unique across concurrent runs.
///
/// Session names are timestamp-based so two resolutions started in the same
/// process never collide with each other's audit trail entries.
#[must_use]
pub fn session_name(now: DateTime<Utc>) -> String {
    format!("convoy-session-{}", now.timestamp_millis())
}

/// Trait for the role-assumption exchange.
///
/// Implementations call the issuing service (e.g. a security token service)
/// with a role ARN and a session name, returning temporary credentials
/// scoped to that role.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    /// Exchanges a role ARN for temporary session credentials.
    ///
    /// # Errors
    ///
    /// Returns a human-readable failure description if the issuing service
    /// rejects the request. Callers treat any failure as fatal to the
    /// resolution pass.
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> std::result::Result<SessionCredentials, String>;
}

/// An exchange that always succeeds with canned credentials.
#[derive(Debug, Default)]
pub struct StaticExchange {
    expires_at: Option<DateTime<Utc>>,
}

impl StaticExchange {
    /// Creates a new static exchange with no expiry.
    #[must_use]
    pub fn new() -> Self {
        Self { expires_at: None }
    }

    /// Sets the expiry reported with issued credentials.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

#[async_trait]
impl CredentialExchange for StaticExchange {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> std::result::Result<SessionCredentials, String> {
        Ok(SessionCredentials {
            access_key_id: format!("ASIA-{session_name}"),
            secret_access_key: "static-secret".to_string(),
            session_token: format!("token-for-{role_arn}"),
            expires_at: self.expires_at,
        })
    }
}

/// An exchange that always fails with a configurable message.
#[derive(Debug)]
pub struct FailingExchange {
    message: String,
}

impl FailingExchange {
    /// Creates a new failing exchange.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl CredentialExchange for FailingExchange {
    async fn assume_role(
        &self,
        _role_arn: &str,
        _session_name: &str,
    ) -> std::result::Result<SessionCredentials, String> {
        Err(self.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_names_encode_the_timestamp() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            session_name(now),
            format!("convoy-session-{}", now.timestamp_millis())
        );
    }

    #[test]
    fn debug_redacts_secret_material() {
        let creds = SessionCredentials {
            access_key_id: "AKIA123".into(),
            secret_access_key: "super-secret".into(),
            session_token: "session-token".into(),
            expires_at: None,
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("AKIA123"));
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("session-token"));
    }

    #[test]
    fn expiry_check() {
        let issued = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let creds = SessionCredentials {
            access_key_id: "AKIA123".into(),
            secret_access_key: "s".into(),
            session_token: "t".into(),
            expires_at: Some(issued + chrono::Duration::hours(1)),
        };
        assert!(!creds.is_expired(issued));
        assert!(creds.is_expired(issued + chrono::Duration::hours(2)));
    }

    #[tokio::test]
    async fn failing_exchange_reports_its_message() {
        let exchange = FailingExchange::new("access denied");
        let result = exchange.assume_role("arn:aws:iam::1:role/x", "s").await;
        assert_eq!(result.unwrap_err(), "access denied");
    }
}
