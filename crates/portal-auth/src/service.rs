//! Authentication session facade
//!
//! `AuthService` owns the whole client-side OAuth flow: authority discovery
//! with unbounded linear-backoff retry, the `authorise` decision ladder
//! (held token → code/refresh exchange → login navigation), callback
//! parameter consumption with nonce validation, token refresh and
//! revocation, and an online-state watch channel.
//!
//! Every externally triggerable operation is deduplicated: concurrent calls
//! join the in-flight one and observe the same settled outcome. Retry loops
//! carry an epoch token so `setup` / `refresh_authority` cancel superseded
//! chains instead of racing them.

use std::sync::Arc;
use std::time::Duration;

use common::{Epoch, RetryPolicy, Secret, SingleFlight};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, warn};
use transport::Transport;

use crate::authority::{Authority, DEFAULT_LOGOUT_URL};
use crate::error::{Error, Result};
use crate::location::{self, Location};
use crate::options::AuthOptions;
use crate::store::KeyStore;
use crate::token::{self, TokenResponse};
use crate::urls;

/// Access token handed out in mock mode.
pub const MOCK_ACCESS_TOKEN: &str = "mock-token";

/// Return URL saved before a login navigation, restored by the host after
/// the callback completes.
const REDIRECT_KEY: &str = "auth_redirect";
/// Marker set once callback parameters have been consumed.
const FINISHED_KEY: &str = "auth_finished";
/// Session-persisted copy of callback parameters, consulted when the
/// visible URL carries none (embedded-frame hosts stash them here).
const AUTH_PARAMS_KEY: &str = "auth_params";

const AUTHORITY_PATH: &str = "/auth/authority";

/// Pause before navigating away, giving the host UI time to settle.
const UI_SETTLE_DELAY: Duration = Duration::from_millis(300);
/// Interval at which `check_token` polls for authority arrival.
const AUTHORITY_POLL_INTERVAL: Duration = Duration::from_millis(300);
/// Discovery backoff: 300 ms growing linearly, capped at 6 s.
const AUTHORITY_RETRY: RetryPolicy = RetryPolicy::new(Duration::from_millis(300), 20);

/// Options-derived state replaced wholesale by `setup`.
struct SetupState {
    options: AuthOptions,
    client_id: String,
    store: Arc<dyn KeyStore>,
}

struct Inner {
    state: RwLock<SetupState>,
    authority: RwLock<Option<Authority>>,
    /// Authorization code held in memory only, never persisted
    code: Mutex<Option<Secret<String>>>,
    /// Caller state recovered from the callback `state` parameter
    caller_state: Mutex<Option<String>>,
    /// Transitions go through `send_replace` so the stored value is
    /// updated even while no receiver is alive
    online_tx: watch::Sender<bool>,
    epoch: Epoch,
    retry: RetryPolicy,
    transport: Arc<dyn Transport>,
    location: Arc<dyn Location>,
    flights_token: SingleFlight<Result<String>>,
    flights_check: SingleFlight<Result<bool>>,
    flights_unit: SingleFlight<Result<()>>,
}

/// Client-side OAuth session facade.
///
/// Cheap to clone; all clones share the same session state.
#[derive(Clone)]
pub struct AuthService {
    inner: Arc<Inner>,
}

impl AuthService {
    /// Build the service and start authority discovery.
    ///
    /// Must be called within a tokio runtime: discovery runs as a spawned
    /// task. In mock mode the authority is installed synchronously and no
    /// network traffic occurs.
    pub fn new(
        options: AuthOptions,
        store: Arc<dyn KeyStore>,
        transport: Arc<dyn Transport>,
        location: Arc<dyn Location>,
    ) -> Self {
        let client_id = urls::client_identity(&options.redirect_uri);
        let mock = options.mock;
        let mock_authority = mock.then(|| Authority::mock(&host_of(&location.origin())));
        let (online_tx, _) = watch::channel(mock);

        let inner = Arc::new(Inner {
            state: RwLock::new(SetupState {
                options,
                client_id,
                store,
            }),
            authority: RwLock::new(mock_authority),
            code: Mutex::new(None),
            caller_state: Mutex::new(None),
            online_tx,
            epoch: Epoch::new(),
            retry: AUTHORITY_RETRY,
            transport,
            location,
            flights_token: SingleFlight::new(),
            flights_check: SingleFlight::new(),
            flights_unit: SingleFlight::new(),
        });

        if mock {
            info!("mock mode, authority installed");
        } else {
            Inner::spawn_authority_load(inner.clone());
        }
        Self { inner }
    }

    /// Replace the options and store, re-derive the client identity, and
    /// restart authority discovery. Any in-flight retry chain from the
    /// previous configuration stops at its next epoch check.
    pub async fn setup(&self, options: AuthOptions, store: Arc<dyn KeyStore>) {
        let client_id = urls::client_identity(&options.redirect_uri);
        let mock = options.mock;
        {
            let mut state = self.inner.state.write().await;
            *state = SetupState {
                options,
                client_id,
                store,
            };
        }
        self.inner.epoch.bump();
        if mock {
            self.inner.install_mock_authority().await;
        } else {
            Inner::spawn_authority_load(self.inner.clone());
        }
    }

    /// Drop the current authority, mark the service offline, and reload.
    pub async fn refresh_authority(&self) {
        *self.inner.authority.write().await = None;
        self.inner.online_tx.send_replace(false);
        self.inner.epoch.bump();
        Inner::spawn_authority_load(self.inner.clone());
    }

    /// Ensure an access token is held, driving whatever flow is needed.
    ///
    /// Resolves to the token when one is held or obtainable through an
    /// exchange; otherwise issues (or reports) a login navigation.
    /// Concurrent calls join the in-flight attempt.
    pub async fn authorise(&self, caller_state: &str) -> Result<String> {
        Inner::authorise_entry(self.inner.clone(), caller_state.to_string()).await
    }

    /// Revoke the held access token at the token endpoint, best effort.
    pub async fn revoke_token(&self) -> Result<()> {
        Inner::revoke_flight(self.inner.clone()).await
    }

    /// Current access token, if held and unexpired.
    ///
    /// Reading an expired token removes it from the store, so a subsequent
    /// `authorise` falls through to the refresh path.
    pub async fn token(&self) -> Option<String> {
        self.inner.current_token().await
    }

    pub async fn has_token(&self) -> bool {
        self.token().await.is_some()
    }

    /// Held refresh token, if any.
    pub async fn refresh_token(&self) -> Option<String> {
        self.inner.refresh_token_value().await
    }

    /// Remove the stored access token without touching the refresh token.
    pub async fn invalidate_token(&self) -> Result<()> {
        let (store, client_id, _) = self.inner.snapshot().await;
        store.remove(&key(&client_id, "access_token")).await
    }

    /// Derived OAuth client identifier for the configured redirect URI.
    pub async fn client_id(&self) -> String {
        self.inner.state.read().await.client_id.clone()
    }

    pub async fn redirect_uri(&self) -> String {
        self.inner.state.read().await.options.redirect_uri.clone()
    }

    /// Currently loaded authority, if discovery has completed.
    pub async fn authority(&self) -> Option<Authority> {
        self.inner.current_authority().await
    }

    /// Whether an authority is currently loaded.
    pub fn is_online(&self) -> bool {
        *self.inner.online_tx.borrow()
    }

    /// Watch channel following authority availability.
    pub fn online_state(&self) -> watch::Receiver<bool> {
        self.inner.online_tx.subscribe()
    }

    /// Caller state recovered from the last consumed callback.
    pub async fn continuation_state(&self) -> Option<String> {
        self.inner.caller_state.lock().await.clone()
    }

    /// Whether this client is trusted (code grant rather than implicit).
    ///
    /// True when the `trust` fragment says so or a previous visit persisted
    /// it; the outcome is re-persisted either way.
    pub async fn trusted(&self) -> bool {
        self.inner.flag("trust", "trusted").await
    }

    /// Whether this installation is marked as a fixed (shared) device.
    pub async fn fixed_device(&self) -> bool {
        self.inner.flag("fixed_device", "fixed_device").await
    }

    /// API base URL for the resolved gateway generation.
    pub async fn api_endpoint(&self) -> String {
        let base = self.inner.base_url().await;
        let versioned = self
            .authority()
            .await
            .and_then(|a| a.version)
            .is_some_and(|v| has_v2_marker(&v));
        if versioned {
            format!("{base}/api/portal/v1")
        } else {
            format!("{base}/api/portal")
        }
    }

    /// Revoke the token, clear every credential for this client identity,
    /// mark the service offline, and navigate to the authority logout URL.
    pub async fn logout(&self) {
        // Revocation is best effort; logout proceeds regardless
        if let Err(e) = Inner::revoke_flight(self.inner.clone()).await {
            warn!(error = %e, "token revocation failed during logout");
        }

        let (store, client_id, _) = self.inner.snapshot().await;
        for key in store.keys().await {
            if key.contains(&client_id) {
                let _ = store.remove(&key).await;
            }
        }

        let url = self
            .authority()
            .await
            .map(|a| a.logout_url)
            .unwrap_or_else(|| DEFAULT_LOGOUT_URL.into());
        self.inner.online_tx.send_replace(false);
        info!("logged out, navigating to logout URL");
        tokio::time::sleep(UI_SETTLE_DELAY).await;
        self.inner.location.assign(&url);
    }
}

impl Inner {
    async fn snapshot(&self) -> (Arc<dyn KeyStore>, String, AuthOptions) {
        let state = self.state.read().await;
        (
            state.store.clone(),
            state.client_id.clone(),
            state.options.clone(),
        )
    }

    async fn current_authority(&self) -> Option<Authority> {
        self.authority.read().await.clone()
    }

    /// Gateway base URL: options host override (scheme taken from the
    /// location origin) or the origin itself.
    async fn base_url(&self) -> String {
        let origin = self.location.origin();
        let (_, _, options) = self.snapshot().await;
        match options.host {
            Some(host) if !host.is_empty() => {
                let scheme = origin.split("://").next().unwrap_or("https");
                format!("{scheme}://{host}")
            }
            _ => origin,
        }
    }

    async fn absolute_url(&self, uri: &str) -> String {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            uri.to_string()
        } else {
            format!("{}{uri}", self.base_url().await)
        }
    }

    fn spawn_authority_load(inner: Arc<Inner>) {
        tokio::spawn(Self::load_authority(inner));
    }

    /// Discovery loop: fetch the authority descriptor, retrying forever
    /// with linear backoff. The epoch token stops a superseded chain the
    /// moment a reconfiguration bumps the generation.
    async fn load_authority(inner: Arc<Inner>) {
        let epoch = inner.epoch.token();
        let (_, _, options) = inner.snapshot().await;
        if options.mock {
            inner.install_mock_authority().await;
            return;
        }

        let fixed = inner.flag("fixed_device", "fixed_device").await;
        let trusted = inner.flag("trust", "trusted").await;
        debug!(fixed_device = fixed, trusted, "loading authority");

        let mut attempts: u32 = 0;
        loop {
            if !epoch.is_current() {
                debug!("authority load superseded, stopping");
                return;
            }

            let url = format!("{}{AUTHORITY_PATH}", inner.base_url().await);
            let authority = match inner.transport.get(&url).await {
                Ok(value) if value.is_object() => serde_json::from_value::<Authority>(value).ok(),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "failed to load authority");
                    None
                }
            };

            match authority {
                Some(authority) => {
                    if !epoch.is_current() {
                        return;
                    }
                    info!(authority = %authority.id, "authority loaded");
                    *inner.authority.write().await = Some(authority);
                    inner.online_tx.send_replace(true);

                    // Kick off authorization eagerly; a login navigation is
                    // a valid terminal outcome here, so the result is
                    // deliberately discarded.
                    let attempt = inner.clone();
                    tokio::spawn(async move {
                        let _ = Inner::authorise_entry(attempt, String::new()).await;
                    });
                    return;
                }
                None => {
                    inner.online_tx.send_replace(false);
                    attempts += 1;
                    tokio::time::sleep(inner.retry.delay(attempts)).await;
                }
            }
        }
    }

    async fn install_mock_authority(&self) {
        let domain = host_of(&self.location.origin());
        *self.authority.write().await = Some(Authority::mock(&domain));
        info!("mock mode, authority installed");
        self.online_tx.send_replace(true);
    }

    async fn authorise_entry(inner: Arc<Inner>, caller_state: String) -> Result<String> {
        let flight = inner.clone();
        inner
            .flights_token
            .run("authorise", move || Self::do_authorise(flight, caller_state))
            .await
    }

    async fn do_authorise(inner: Arc<Inner>, caller_state: String) -> Result<String> {
        let Some(authority) = inner.current_authority().await else {
            return Err(Error::AuthorityNotLoaded);
        };

        // Consume any pending callback parameters; both outcomes converge
        // on the decision ladder below.
        let _ = Self::check_token_flight(inner.clone()).await;

        if let Some(token) = inner.current_token().await {
            return Ok(token);
        }

        let has_code = inner.code.lock().await.is_some();
        let has_refresh = inner.refresh_token_value().await.is_some();
        if has_code || has_refresh {
            Self::generate_token_flight(inner.clone()).await?;
            return inner
                .current_token()
                .await
                .ok_or_else(|| Error::TokenExchange("token endpoint issued no access token".into()));
        }

        if authority.session {
            let login_url = inner.create_login_url(&caller_state).await?;
            let (store, _, _) = inner.snapshot().await;
            let _ = store.set(REDIRECT_KEY, inner.location.href()).await;
            info!("redirecting to authorization endpoint");
            tokio::time::sleep(UI_SETTLE_DELAY).await;
            inner.location.assign(&login_url);
            return Err(Error::LoginRedirect);
        }

        let login_url = authority
            .login_url
            .replace("{{url}}", &urlencoding::encode(&inner.location.href()));
        let (_, _, options) = inner.snapshot().await;
        if options.handle_login {
            info!("redirecting to login");
            tokio::time::sleep(UI_SETTLE_DELAY).await;
            inner.location.assign(&login_url);
            Err(Error::LoginRedirect)
        } else {
            Err(Error::LoginRequired(login_url))
        }
    }

    async fn check_token_flight(inner: Arc<Inner>) -> Result<bool> {
        let flight = inner.clone();
        inner
            .flights_check
            .run("check_token", move || Self::do_check_token(flight))
            .await
    }

    /// Wait for the authority, then report whether a token is held,
    /// consuming callback parameters if not.
    async fn do_check_token(inner: Arc<Inner>) -> Result<bool> {
        loop {
            if inner.current_authority().await.is_some() {
                if inner.current_token().await.is_some() {
                    return Ok(true);
                }
                return Self::check_params_flight(inner).await;
            }
            tokio::time::sleep(AUTHORITY_POLL_INTERVAL).await;
        }
    }

    async fn check_params_flight(inner: Arc<Inner>) -> Result<bool> {
        let flight = inner.clone();
        inner
            .flights_check
            .run("check_params", move || Self::do_check_params(flight))
            .await
    }

    /// Consume OAuth callback parameters from the location (or the
    /// persisted fallback), validating the anti-CSRF nonce.
    ///
    /// The code and refresh token are persisted before nonce validation;
    /// they were issued to this client and remain usable. The access token
    /// is only persisted after the nonce matches.
    async fn do_check_params(inner: Arc<Inner>) -> Result<bool> {
        let (store, client_id, _) = inner.snapshot().await;

        let mut params = location::parse_fragments(inner.location.as_ref());
        if params.is_empty() {
            if let Some(saved) = store.get(AUTH_PARAMS_KEY).await {
                params = serde_json::from_str(&saved).unwrap_or_default();
            }
        }

        let has_any = ["code", "access_token", "refresh_token"]
            .iter()
            .any(|k| params.contains_key(*k));
        if !has_any {
            return Err(Error::NoAuthParams);
        }

        if let Some(code) = params.get("code") {
            *inner.code.lock().await = Some(Secret::new(code.clone()));
            location::remove_fragment(inner.location.as_ref(), "code");
        }
        if let Some(refresh) = params.get("refresh_token") {
            store
                .set(&key(&client_id, "refresh_token"), refresh.clone())
                .await?;
            location::remove_fragment(inner.location.as_ref(), "refresh_token");
        }

        let state = params.get("state").cloned().unwrap_or_default();
        location::remove_fragment(inner.location.as_ref(), "state");
        location::remove_fragment(inner.location.as_ref(), "token_type");

        let (returned_nonce, caller_state) = match state.split_once(';') {
            Some((nonce, rest)) => (nonce.to_string(), Some(rest.to_string())),
            None => (state, None),
        };
        let saved_nonce = store
            .get(&key(&client_id, "nonce"))
            .await
            .unwrap_or_default();
        if returned_nonce != saved_nonce {
            warn!("state nonce does not match, rejecting callback");
            return Err(Error::NonceMismatch);
        }

        let had_access_token = params.contains_key("access_token");
        if let Some(access) = params.get("access_token") {
            store
                .set(&key(&client_id, "access_token"), access.clone())
                .await?;
            location::remove_fragment(inner.location.as_ref(), "access_token");
        }
        if let Some(expires_in) = params.get("expires_in").and_then(|v| v.parse::<u64>().ok()) {
            store
                .set(
                    &key(&client_id, "expires_at"),
                    token::expires_at_millis(expires_in).to_string(),
                )
                .await?;
        }
        location::remove_fragment(inner.location.as_ref(), "expires_in");

        if let Some(caller_state) = caller_state.filter(|s| !s.is_empty()) {
            *inner.caller_state.lock().await = Some(caller_state);
        }

        let _ = store.remove(REDIRECT_KEY).await;
        store.set(FINISHED_KEY, "true".into()).await?;
        Ok(had_access_token)
    }

    async fn generate_token_flight(inner: Arc<Inner>) -> Result<()> {
        let flight = inner.clone();
        inner
            .flights_unit
            .run("generate_token", move || Self::do_generate_token(flight))
            .await
    }

    /// Exchange the held code or refresh token at the token endpoint and
    /// persist each field the response carries.
    async fn do_generate_token(inner: Arc<Inner>) -> Result<()> {
        let (store, client_id, options) = inner.snapshot().await;

        let refresh = inner.refresh_token_value().await;
        let code = inner
            .code
            .lock()
            .await
            .as_ref()
            .map(|c| c.expose().clone());

        let url = urls::token_url(
            &options.token_uri,
            &client_id,
            &options.redirect_uri,
            refresh.as_deref(),
            code.as_deref(),
        );
        let url = inner.absolute_url(&url).await;

        let response = inner
            .transport
            .post(&url, String::new())
            .await
            .map_err(|e| match e {
                transport::Error::Status { status, body } => {
                    warn!(status, "token endpoint rejected the request");
                    Error::TokenExchange(format!("token endpoint returned {status}: {body}"))
                }
                other => {
                    warn!(error = %other, "token request failed");
                    Error::Http(other.to_string())
                }
            })?;

        let tokens: TokenResponse = serde_json::from_value(response)
            .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;

        if let Some(access) = tokens.access_token {
            store.set(&key(&client_id, "access_token"), access).await?;
        }
        if let Some(refresh) = tokens.refresh_token {
            store
                .set(&key(&client_id, "refresh_token"), refresh)
                .await?;
        }
        if let Some(expires_in) = tokens.expires_in {
            store
                .set(
                    &key(&client_id, "expires_at"),
                    token::expires_at_millis(expires_in).to_string(),
                )
                .await?;
        }
        info!("token exchange succeeded");
        Ok(())
    }

    async fn revoke_flight(inner: Arc<Inner>) -> Result<()> {
        let flight = inner.clone();
        inner
            .flights_unit
            .run("revoke_token", move || Self::do_revoke_token(flight))
            .await
    }

    /// Revoke the held access token. The server's verdict is ignored; only
    /// a transport-level failure surfaces.
    async fn do_revoke_token(inner: Arc<Inner>) -> Result<()> {
        let Some(token) = inner.current_token().await else {
            return Ok(());
        };
        let (_, _, options) = inner.snapshot().await;
        let url = inner
            .absolute_url(&urls::revoke_url(&options.token_uri, &token))
            .await;
        match inner.transport.post(&url, String::new()).await {
            Ok(_) | Err(transport::Error::Status { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current access token; reading an expired one invalidates it.
    async fn current_token(&self) -> Option<String> {
        let (store, client_id, options) = self.snapshot().await;
        if options.mock {
            return Some(MOCK_ACCESS_TOKEN.to_string());
        }

        if let Some(expires_at) = store
            .get(&key(&client_id, "expires_at"))
            .await
            .and_then(|v| v.parse::<u64>().ok())
        {
            if token::now_millis() >= expires_at {
                info!("access token expired, invalidating");
                let _ = store.remove(&key(&client_id, "access_token")).await;
            }
        }

        store
            .get(&key(&client_id, "access_token"))
            .await
            .filter(|t| !t.is_empty())
    }

    async fn refresh_token_value(&self) -> Option<String> {
        let (store, client_id, _) = self.snapshot().await;
        store
            .get(&key(&client_id, "refresh_token"))
            .await
            .filter(|t| !t.is_empty())
    }

    /// Sticky boolean: true when the fragment says so or a previous visit
    /// persisted it. The outcome is written back either way.
    async fn flag(&self, fragment_name: &str, suffix: &str) -> bool {
        let (store, client_id, _) = self.snapshot().await;
        let fragments = location::parse_fragments(self.location.as_ref());
        let from_fragment = fragments.get(fragment_name).is_some_and(|v| v == "true");
        let store_key = key(&client_id, suffix);
        let value = from_fragment || store.get(&store_key).await.as_deref() == Some("true");
        let _ = store.set(&store_key, value.to_string()).await;
        value
    }

    /// Build the authorization URL, persisting a fresh nonce first.
    async fn create_login_url(&self, caller_state: &str) -> Result<String> {
        let (store, client_id, options) = self.snapshot().await;
        let trusted = self.flag("trust", "trusted").await;
        let nonce = urls::generate_nonce(urls::DEFAULT_NONCE_LENGTH);
        store.set(&key(&client_id, "nonce"), nonce.clone()).await?;
        Ok(urls::login_url(
            &options.auth_uri,
            &client_id,
            &options.redirect_uri,
            &options.scope,
            trusted,
            &nonce,
            caller_state,
        ))
    }
}

/// Credential store key for one client identity.
fn key(client_id: &str, suffix: &str) -> String {
    format!("{client_id}_{suffix}")
}

/// Whether a version string carries a `2.<digits>.<digits>` sequence
/// anywhere, selecting the v1 API mount.
fn has_v2_marker(version: &str) -> bool {
    let bytes = version.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] != b'2' || bytes.get(i + 1) != Some(&b'.') {
            continue;
        }
        let rest = &bytes[i + 2..];
        let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits > 0
            && rest.get(digits) == Some(&b'.')
            && rest.get(digits + 1).is_some_and(|b| b.is_ascii_digit())
        {
            return true;
        }
    }
    false
}

/// Host part of an origin, e.g. `localhost:4200` from
/// `http://localhost:4200`.
fn host_of(origin: &str) -> String {
    origin
        .split_once("://")
        .map(|(_, host)| host)
        .unwrap_or(origin)
        .to_string()
}
