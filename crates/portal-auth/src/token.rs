//! Token endpoint response model and expiry math
//!
//! Every field of `TokenResponse` is optional: a refresh may renew only some
//! of them, and each present field is persisted independently. `expires_in`
//! is a delta in seconds from response time; it is converted to an absolute
//! unix-millisecond expiry at storage time, truncated to the second.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};

/// Response from the token endpoint for exchange and refresh.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires. Some gateways send this as
    /// a string, so both encodings are accepted.
    #[serde(default, deserialize_with = "seconds_or_string")]
    pub expires_in: Option<u64>,
}

fn seconds_or_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Seconds(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
    })
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Absolute expiry in unix milliseconds: now + `expires_in`, truncated to
/// the second.
pub fn expires_at_millis(expires_in_secs: u64) -> u64 {
    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    (now_secs + expires_in_secs) * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_numeric_expiry() {
        let json = r#"{"access_token":"at","refresh_token":"rt","expires_in":3600}"#;
        let tokens: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(tokens.access_token.as_deref(), Some("at"));
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
        assert_eq!(tokens.expires_in, Some(3600));
    }

    #[test]
    fn deserializes_string_expiry() {
        let json = r#"{"access_token":"at","expires_in":"120"}"#;
        let tokens: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(tokens.expires_in, Some(120));
    }

    #[test]
    fn partial_response_leaves_fields_absent() {
        let tokens: TokenResponse = serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
        assert!(tokens.refresh_token.is_none());
        assert!(tokens.expires_in.is_none());
    }

    #[test]
    fn unparseable_expiry_is_absent() {
        let tokens: TokenResponse =
            serde_json::from_str(r#"{"expires_in":"soonish"}"#).unwrap();
        assert!(tokens.expires_in.is_none());
    }

    #[test]
    fn expiry_is_relative_to_now_and_second_aligned() {
        let expires_at = expires_at_millis(60);
        let now = now_millis();
        assert!(expires_at >= now + 59_000, "at least ~60s out");
        assert!(expires_at <= now + 61_000, "no more than ~60s out");
        assert_eq!(expires_at % 1000, 0, "truncated to the second");
    }
}
