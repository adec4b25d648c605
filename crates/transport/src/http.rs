//! reqwest-backed transport
//!
//! The default `Transport` implementation for native hosts. Response bodies
//! are read as text and parsed leniently: endpoints like token revocation
//! return empty or non-JSON bodies on success, and those must not surface
//! as errors.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::{Error, Result, Transport};

/// HTTP transport over a shared reqwest client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build on an existing client (shared connection pool, custom TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading response body: {e}")))?;

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(parse_body(&body))
    }
}

/// Lenient body parse: empty or malformed bodies become `Null`.
fn parse_body(body: &str) -> serde_json::Value {
    if body.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(body).unwrap_or(serde_json::Value::Null)
}

impl Transport for HttpTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(async move {
            debug!(url, "GET");
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| Error::Http(format!("GET {url} failed: {e}")))?;
            Self::read_json(response).await
        })
    }

    fn post<'a>(
        &'a self,
        url: &'a str,
        body: String,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(async move {
            debug!(url, "POST");
            let response = self
                .client
                .post(url)
                .body(body)
                .send()
                .await
                .map_err(|e| Error::Http(format!("POST {url} failed: {e}")))?;
            Self::read_json(response).await
        })
    }
}
