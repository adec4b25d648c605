//! Error types for authentication operations

/// Errors from the authentication state machine.
///
/// Variants carry string payloads and the enum is `Clone` so a settled
/// outcome can be handed to every caller joined on the same deduplicated
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// `authorise` was called before an authority finished loading
    #[error("authority is not loaded")]
    AuthorityNotLoaded,

    /// The state returned by the authorization server does not carry the
    /// nonce persisted before the redirect. Treated as a potential CSRF
    /// attack: terminal, never retried.
    #[error("state nonce does not match the persisted nonce")]
    NonceMismatch,

    /// Neither the URL nor the persisted fallback held auth parameters
    #[error("no authentication parameters available")]
    NoAuthParams,

    /// A login navigation has been issued; the host page is unloading
    #[error("redirecting to login")]
    LoginRedirect,

    /// Login handling is disabled; the host must redirect to this URL itself
    #[error("login required at {0}")]
    LoginRequired(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<transport::Error> for Error {
    fn from(err: transport::Error) -> Self {
        Error::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        assert_eq!(
            Error::AuthorityNotLoaded.to_string(),
            "authority is not loaded"
        );
        assert_eq!(
            Error::LoginRequired("/login".into()).to_string(),
            "login required at /login"
        );
    }

    #[test]
    fn transport_errors_convert() {
        let err: Error = transport::Error::Http("timed out".into()).into();
        assert_eq!(err, Error::Http("HTTP request failed: timed out".into()));
    }
}
