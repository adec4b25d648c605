//! Authentication authority descriptor
//!
//! The authority describes how to authenticate for the current domain. It is
//! loaded once per service lifetime from the discovery endpoint, replaced
//! wholesale on `refresh_authority`, and never partially mutated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default login URL template. `{{url}}` is replaced with the encoded
/// current location so the user returns where they left off.
pub const DEFAULT_LOGIN_URL: &str = "/login?continue={{url}}";

/// Default logout URL.
pub const DEFAULT_LOGOUT_URL: &str = "/logout";

/// Server-side description of the authentication authority for a domain.
///
/// Every field defaults so that any JSON object the discovery endpoint
/// returns is accepted; a non-object body is a retry condition handled by
/// the resolver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Authority {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Domain the authority answers for
    #[serde(default, alias = "dom")]
    pub domain: String,
    /// Login URL template containing the `{{url}}` continuation placeholder
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_logout_url")]
    pub logout_url: String,
    /// Whether the server manages an HTTP session rather than bearer tokens
    #[serde(default)]
    pub session: bool,
    #[serde(default)]
    pub production: bool,
    /// Opaque configuration metadata
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    /// Gateway API version
    #[serde(default)]
    pub version: Option<String>,
    /// URL of the gateway metrics interface
    #[serde(default)]
    pub metrics: Option<String>,
}

fn default_login_url() -> String {
    DEFAULT_LOGIN_URL.into()
}

fn default_logout_url() -> String {
    DEFAULT_LOGOUT_URL.into()
}

impl Authority {
    /// Fixed authority installed in mock mode.
    pub fn mock(domain: &str) -> Self {
        Self {
            id: "mock-authority".into(),
            name: domain.into(),
            description: String::new(),
            domain: domain.into(),
            login_url: DEFAULT_LOGIN_URL.into(),
            logout_url: DEFAULT_LOGOUT_URL.into(),
            session: true,
            production: false,
            config: HashMap::new(),
            version: Some("2.0.0".into()),
            metrics: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_full_descriptor() {
        let json = r#"{
            "id": "authority-1",
            "name": "Example",
            "description": "main site",
            "dom": "portal.example.com",
            "login_url": "/login?continue={{url}}",
            "logout_url": "/bye",
            "session": true,
            "production": true,
            "config": {"theme": "dark"},
            "version": "2.1.0",
            "metrics": "https://metrics.example.com"
        }"#;
        let authority: Authority = serde_json::from_str(json).unwrap();
        assert_eq!(authority.id, "authority-1");
        assert_eq!(authority.domain, "portal.example.com");
        assert!(authority.session);
        assert!(authority.production);
        assert_eq!(authority.version.as_deref(), Some("2.1.0"));
        assert_eq!(authority.config["theme"], "dark");
    }

    #[test]
    fn sparse_object_gets_defaults() {
        let authority: Authority = serde_json::from_str(r#"{"id": "a"}"#).unwrap();
        assert_eq!(authority.login_url, DEFAULT_LOGIN_URL);
        assert_eq!(authority.logout_url, DEFAULT_LOGOUT_URL);
        assert!(!authority.session);
        assert!(authority.version.is_none());
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(serde_json::from_str::<Authority>("null").is_err());
        assert!(serde_json::from_str::<Authority>(r#""text""#).is_err());
    }

    #[test]
    fn mock_authority_is_session_based() {
        let authority = Authority::mock("localhost:4200");
        assert_eq!(authority.id, "mock-authority");
        assert_eq!(authority.domain, "localhost:4200");
        assert!(authority.session);
        assert!(!authority.production);
    }
}
