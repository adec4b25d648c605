//! Client identity, nonce generation, and OAuth URL builders
//!
//! The client identity is a stable digest of the redirect URI, so
//! credentials persist across reloads but stay isolated per redirect target
//! when several applications share a domain. The nonce is the anti-CSRF
//! value round-tripped through the authorization redirect inside the
//! `state` parameter.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Default nonce length in characters.
pub const DEFAULT_NONCE_LENGTH: usize = 40;

/// Derive the OAuth client identifier from a redirect URI.
///
/// Deterministic: the same URI always yields the same identifier, which
/// namespaces every persisted credential key.
pub fn client_identity(redirect_uri: &str) -> String {
    let hash = Sha256::digest(redirect_uri.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random alphanumeric nonce.
pub fn generate_nonce(length: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut bytes = vec![0u8; length];
    rand::rng().fill(&mut bytes[..]);
    bytes
        .iter()
        .map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char)
        .collect()
}

/// Build the authorization URL the user is sent to.
///
/// The `state` parameter is `"<nonce>;<caller_state>"`, or the bare nonce
/// when the caller supplied no state. Trusted clients use the
/// authorization-code grant; untrusted clients fall back to the implicit
/// grant. An `auth_uri` that already carries a query keeps it.
pub fn login_url(
    auth_uri: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    trusted: bool,
    nonce: &str,
    caller_state: &str,
) -> String {
    let state = if caller_state.is_empty() {
        nonce.to_string()
    } else {
        format!("{nonce};{caller_state}")
    };
    let response_type = if trusted { "code" } else { "token" };
    let separator = if auth_uri.contains('?') { '&' } else { '?' };
    format!(
        "{auth_uri}{separator}response_type={}&client_id={}&state={}&redirect_uri={}&scope={}",
        urlencoding::encode(response_type),
        urlencoding::encode(client_id),
        urlencoding::encode(&state),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(scope),
    )
}

/// Build the token endpoint URL for exchange or refresh.
///
/// A held refresh token wins over an authorization code.
pub fn token_url(
    token_uri: &str,
    client_id: &str,
    redirect_uri: &str,
    refresh_token: Option<&str>,
    code: Option<&str>,
) -> String {
    let mut url = format!(
        "{token_uri}?client_id={}&redirect_uri={}",
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
    );
    match refresh_token {
        Some(refresh) => {
            url.push_str(&format!(
                "&refresh_token={}&grant_type=refresh_token",
                urlencoding::encode(refresh)
            ));
        }
        None => {
            url.push_str(&format!(
                "&code={}&grant_type=authorization_code",
                urlencoding::encode(code.unwrap_or(""))
            ));
        }
    }
    url
}

/// Build the best-effort revocation URL.
pub fn revoke_url(token_uri: &str, access_token: &str) -> String {
    format!("{token_uri}?token={}", urlencoding::encode(access_token))
}
