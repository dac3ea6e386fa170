//! Session artifact ("cookie jar") types.
//!
//! A session artifact is the complete set of cookies extracted from an
//! authenticated browser context, together with the user-agent string the
//! session was established under. The target platform binds sessions to the
//! UA fingerprint, so the user-agent must be replayed verbatim whenever the
//! jar is injected into a fresh context.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Cookie SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

/// A single cookie record as extracted from the browser context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Expiry as milliseconds since epoch; `None` for session cookies.
    #[serde(default)]
    pub expires_ms: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: SameSite,
}

impl Cookie {
    /// Create a cookie with the given name/value scoped to a domain,
    /// defaulting to path `/` and no expiry.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
            expires_ms: None,
            secure: false,
            http_only: false,
            same_site: SameSite::default(),
        }
    }

    /// Whether this cookie has an expiry timestamp in the past.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_ms, Some(expiry) if expiry <= now_ms)
    }
}

/// Validity of a stored session artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionValidity {
    #[default]
    Unverified,
    Valid,
    Invalid,
    Expired,
}

/// The persisted session artifact for one tenant.
///
/// Artifacts are always replaced wholesale, never merged field by field, so
/// cookies from different login ceremonies can never end up mixed in one jar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionArtifact {
    pub cookies: Vec<Cookie>,
    /// User-agent of the browser context the cookies were extracted from.
    pub source_user_agent: String,
    /// Extraction timestamp (milliseconds since epoch).
    pub captured_at_ms: i64,
    pub validity: SessionValidity,
    /// Reason recorded by the last `invalidate`, if any.
    #[serde(default)]
    pub invalid_reason: Option<String>,
}

impl SessionArtifact {
    /// Create an unverified artifact captured now.
    pub fn new(cookies: Vec<Cookie>, source_user_agent: impl Into<String>) -> Self {
        Self {
            cookies,
            source_user_agent: source_user_agent.into(),
            captured_at_ms: Utc::now().timestamp_millis(),
            validity: SessionValidity::Unverified,
            invalid_reason: None,
        }
    }

    /// Mark the artifact valid.
    pub fn with_validity(mut self, validity: SessionValidity) -> Self {
        self.validity = validity;
        self
    }

    /// Look up a cookie by name.
    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    /// Names from `required` that are absent from the jar.
    pub fn missing_keys(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.cookie(name).is_none())
            .cloned()
            .collect()
    }

    /// Whether any of the required cookies carries an expiry in the past.
    pub fn required_expired(&self, required: &[String], now_ms: i64) -> bool {
        required
            .iter()
            .filter_map(|name| self.cookie(name))
            .any(|cookie| cookie.is_expired(now_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> Vec<String> {
        vec!["auth_token".to_string(), "session".to_string()]
    }

    #[test]
    fn test_missing_keys_reports_absent_cookies() {
        let artifact = SessionArtifact::new(
            vec![Cookie::new("session", "xyz", ".example.com")],
            "Mozilla/5.0",
        );

        assert_eq!(artifact.missing_keys(&required()), vec!["auth_token"]);
    }

    #[test]
    fn test_missing_keys_empty_for_complete_jar() {
        let artifact = SessionArtifact::new(
            vec![
                Cookie::new("auth_token", "abc", ".example.com"),
                Cookie::new("session", "xyz", ".example.com"),
            ],
            "Mozilla/5.0",
        );

        assert!(artifact.missing_keys(&required()).is_empty());
    }

    #[test]
    fn test_required_expired_ignores_session_cookies() {
        let mut expiring = Cookie::new("auth_token", "abc", ".example.com");
        expiring.expires_ms = Some(1_000);
        let artifact = SessionArtifact::new(
            vec![expiring, Cookie::new("session", "xyz", ".example.com")],
            "Mozilla/5.0",
        );

        assert!(artifact.required_expired(&required(), 2_000));
        assert!(!artifact.required_expired(&required(), 500));
    }

    #[test]
    fn test_cookie_serde_defaults() {
        let json = r#"{"name":"session","value":"xyz","domain":".example.com","path":"/"}"#;
        let cookie: Cookie = serde_json::from_str(json).unwrap();
        assert!(!cookie.secure);
        assert_eq!(cookie.same_site, SameSite::Lax);
        assert!(cookie.expires_ms.is_none());
    }
}
