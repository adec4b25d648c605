//! HTTP capability boundary for the portal client
//!
//! Defines the `Transport` trait the auth state machine is written against.
//! The library never talks to reqwest directly; hosts inject either the
//! provided `HttpTransport` or their own implementation (embedded webview
//! bridges, test doubles).
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn Transport>`).

pub mod http;

pub use http::HttpTransport;

use std::future::Future;
use std::pin::Pin;

/// Errors from transport operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Minimal single-shot HTTP capability: `get(url)` and `post(url, body)`,
/// each yielding the response body as JSON.
///
/// Contract: a non-2xx response is `Error::Status` with the body text; a
/// 2xx response with an empty or non-JSON body yields `Value::Null` so
/// callers that ignore response content (revocation) are not failed by it.
pub trait Transport: Send + Sync {
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

    fn post<'a>(
        &'a self,
        url: &'a str,
        body: String,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = Error::Http("connection refused".into());
        assert_eq!(err.to_string(), "HTTP request failed: connection refused");

        let err = Error::Status {
            status: 401,
            body: "unauthorized".into(),
        };
        assert_eq!(err.to_string(), "unexpected status 401: unauthorized");
    }
}
