//! Manual cookie payload parsing.
//!
//! Degraded fallback for environments where interactive automation cannot
//! run: an operator pastes either a `Cookie:` header style string or a JSON
//! array of cookie records. The result feeds the same required-key
//! validation as an extracted jar; parsing never bypasses it.

use serde::Deserialize;

use autoseek_models::{Cookie, SameSite};

use crate::error::AutomationError;

/// Cookie record as accepted from a manual JSON payload. Field aliases
/// cover the camelCase shape produced by browser devtools exports.
#[derive(Debug, Deserialize)]
struct ManualCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, alias = "expires_ms")]
    expires: Option<i64>,
    #[serde(default)]
    secure: bool,
    #[serde(default, alias = "httpOnly")]
    http_only: bool,
    #[serde(default, alias = "sameSite")]
    same_site: Option<SameSite>,
}

/// Parse a raw manual payload into the canonical cookie shape.
///
/// Accepts a JSON array (`[{"name": ..., "value": ...}, ...]`) or a
/// semicolon-separated `name=value` header string. `default_domain` is
/// applied wherever the payload does not carry a domain of its own.
pub fn parse_cookie_payload(
    raw: &str,
    default_domain: &str,
) -> Result<Vec<Cookie>, AutomationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AutomationError::InvalidCookiePayload(
            "payload is empty".to_string(),
        ));
    }

    let cookies = if trimmed.starts_with('[') {
        parse_json_array(trimmed, default_domain)?
    } else {
        parse_header_string(trimmed, default_domain)?
    };

    if cookies.is_empty() {
        return Err(AutomationError::InvalidCookiePayload(
            "payload contains no cookies".to_string(),
        ));
    }
    Ok(cookies)
}

fn parse_json_array(raw: &str, default_domain: &str) -> Result<Vec<Cookie>, AutomationError> {
    let records: Vec<ManualCookie> = serde_json::from_str(raw)
        .map_err(|e| AutomationError::InvalidCookiePayload(format!("bad JSON array: {e}")))?;

    Ok(records
        .into_iter()
        .map(|record| Cookie {
            name: record.name,
            value: record.value,
            domain: record
                .domain
                .unwrap_or_else(|| default_domain.to_string()),
            path: record.path.unwrap_or_else(|| "/".to_string()),
            expires_ms: record.expires,
            secure: record.secure,
            http_only: record.http_only,
            same_site: record.same_site.unwrap_or_default(),
        })
        .collect())
}

fn parse_header_string(raw: &str, default_domain: &str) -> Result<Vec<Cookie>, AutomationError> {
    let mut cookies = Vec::new();
    for piece in raw.split(';') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let Some((name, value)) = piece.split_once('=') else {
            return Err(AutomationError::InvalidCookiePayload(format!(
                "expected name=value, got {piece:?}"
            )));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(AutomationError::InvalidCookiePayload(
                "cookie with empty name".to_string(),
            ));
        }
        cookies.push(Cookie::new(name, value.trim(), default_domain));
    }
    Ok(cookies)
}
