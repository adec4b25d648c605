//! Client-side OAuth authentication library
//!
//! Drives the whole token lifecycle against a portal gateway: authority
//! discovery, authorization and login redirects, code/refresh token
//! exchange, anti-CSRF nonce validation, credential persistence, and
//! revocation. The crate is host-agnostic — the embedding application
//! supplies a `Location` (URL surface), a `KeyStore` (credential store),
//! and a `Transport` (HTTP), and observes online state through a watch
//! channel.
//!
//! Session flow:
//! 1. Host builds `AuthOptions` (literal or `AuthOptions::load()`)
//! 2. `AuthService::new()` starts authority discovery with retry
//! 3. `AuthService::authorise()` resolves a token or issues a login
//!    navigation (`Error::LoginRedirect` / `Error::LoginRequired`)
//! 4. After the callback, `authorise` consumes the URL parameters,
//!    validates the nonce, and exchanges the code if one was issued
//! 5. `AuthService::token()` hands out the access token until it expires
//! 6. `AuthService::logout()` revokes, clears credentials, and navigates

pub mod authority;
pub mod error;
pub mod location;
pub mod options;
pub mod service;
pub mod store;
pub mod token;
pub mod urls;

#[cfg(test)]
mod testing;

pub use authority::{Authority, DEFAULT_LOGIN_URL, DEFAULT_LOGOUT_URL};
pub use error::{Error, Result};
pub use location::{Location, MemoryLocation};
pub use options::{AuthOptions, StorageScope};
pub use service::{AuthService, MOCK_ACCESS_TOKEN};
pub use store::{FileStore, KeyStore, MemoryStore, for_scope};
pub use token::TokenResponse;
