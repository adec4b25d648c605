//! Authentication options
//!
//! Supplied once at construction (or via `setup`, which fully replaces them
//! and re-derives dependent state). Options can be built literally or loaded
//! from a TOML file.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Which credential store scope to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageScope {
    /// Profile-scoped, survives restarts (file-backed)
    #[default]
    Profile,
    /// Process-lifetime only (in-memory)
    Session,
}

/// Configuration for the authentication service.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthOptions {
    /// Host and port of the gateway, overriding the location origin
    #[serde(default)]
    pub host: Option<String>,
    /// URI of the authorization endpoint
    pub auth_uri: String,
    /// URI of the token endpoint (exchange, refresh, revoke)
    pub token_uri: String,
    /// URI the authorization server redirects back to
    pub redirect_uri: String,
    /// Scope requested during authorization
    pub scope: String,
    /// Credential store scope selector
    #[serde(default)]
    pub storage: StorageScope,
    /// Whether the host performs authorization in an embedded frame.
    /// Advisory to the host; the state machine itself is frame-agnostic.
    #[serde(default)]
    pub use_iframe: bool,
    /// Whether the service issues login navigations itself. When false the
    /// host receives the login URL and redirects on its own terms.
    #[serde(default = "default_true")]
    pub handle_login: bool,
    /// Mock mode: fixed authority and token, no network
    #[serde(default)]
    pub mock: bool,
}

fn default_true() -> bool {
    true
}

impl AuthOptions {
    /// Load options from a TOML file and validate them.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let options: AuthOptions =
            toml::from_str(&contents).map_err(|e| Error::Config(format!("parsing options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Check required URIs are present.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("auth_uri", &self.auth_uri),
            ("token_uri", &self.token_uri),
            ("redirect_uri", &self.redirect_uri),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}
