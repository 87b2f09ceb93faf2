//! Firebase Auth connector implementation
//!
//! Implements `IdentityProvider` for the Firebase Auth REST API v1.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::identity::{
    IdentityProvider, ProviderSession, SessionListener, SessionSubscription, SharedSession,
};
use bridge_traits::time::{Clock, SystemClock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::FirebaseConfig;
use crate::error::FirebaseError;
use crate::types::{
    AccountResponse, DeleteAccountRequest, ErrorEnvelope, FirebaseTokens, PasswordRequest,
    RefreshTokenRequest, RefreshTokenResponse,
};

/// ID tokens this close to expiry are refreshed before being handed out.
const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

/// Raw REST calls, shared by the provider and every session it creates.
struct FirebaseApi {
    http_client: Arc<dyn HttpClient>,
    config: FirebaseConfig,
    clock: Arc<dyn Clock>,
}

impl FirebaseApi {
    async fn password_call(
        &self,
        method: &str,
        email: &str,
        password: &str,
        policy: Option<RetryPolicy>,
    ) -> std::result::Result<AccountResponse, FirebaseError> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let request = self.post(self.config.accounts_url(method)).json(&body)?;
        let response = self.send(request, policy).await?;
        Self::parse(&response)
    }

    async fn delete_account(&self, id_token: &str) -> std::result::Result<(), FirebaseError> {
        let request = self
            .post(self.config.accounts_url("delete"))
            .json(&DeleteAccountRequest { id_token })?;
        self.send(request, Some(RetryPolicy::no_retry())).await?;
        Ok(())
    }

    async fn refresh(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<RefreshTokenResponse, FirebaseError> {
        let request = self
            .post(self.config.token_url())
            .form(&RefreshTokenRequest::new(refresh_token))?;
        let response = self.send(request, None).await?;
        Self::parse(&response)
    }

    fn post(&self, url: String) -> HttpRequest {
        HttpRequest::new(HttpMethod::Post, url).timeout(self.config.request_timeout)
    }

    /// Executes the request and turns non-2xx replies into [`FirebaseError`].
    async fn send(
        &self,
        request: HttpRequest,
        policy: Option<RetryPolicy>,
    ) -> std::result::Result<HttpResponse, FirebaseError> {
        let response = match policy {
            Some(policy) => self.http_client.execute_with_retry(request, policy).await?,
            None => self.http_client.execute(request).await?,
        };

        if response.is_success() {
            return Ok(response);
        }

        match response.json::<ErrorEnvelope>() {
            Ok(envelope) => {
                let error = FirebaseError::from_api_message(&envelope.error.message);
                debug!(status = response.status, code = ?error.code(), "Firebase refused request");
                Err(error)
            }
            Err(_) => {
                warn!(status = response.status, "Firebase returned an unrecognized error");
                Err(FirebaseError::HttpStatus {
                    status: response.status,
                })
            }
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(
        response: &HttpResponse,
    ) -> std::result::Result<T, FirebaseError> {
        serde_json::from_slice(&response.body).map_err(|e| FirebaseError::ParseError(e.to_string()))
    }
}

/// A signed-in Firebase account.
///
/// Holds the ID/refresh token pair and refreshes the ID token on demand.
pub struct FirebaseSession {
    uid: String,
    email: Option<String>,
    tokens: tokio::sync::Mutex<FirebaseTokens>,
    api: Arc<FirebaseApi>,
}

impl FirebaseSession {
    fn from_account(
        account: AccountResponse,
        api: Arc<FirebaseApi>,
    ) -> std::result::Result<Self, FirebaseError> {
        let tokens = FirebaseTokens::issued(
            account.id_token,
            account.refresh_token,
            &account.expires_in,
            api.clock.as_ref(),
        )?;

        Ok(Self {
            uid: account.local_id,
            email: account.email,
            tokens: tokio::sync::Mutex::new(tokens),
            api,
        })
    }
}

#[async_trait]
impl ProviderSession for FirebaseSession {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[instrument(skip(self), fields(uid = %self.uid))]
    async fn id_token(&self, force_refresh: bool) -> Result<String> {
        // Held across the refresh so concurrent callers share one exchange.
        let mut tokens = self.tokens.lock().await;

        if !force_refresh
            && !tokens.is_expired_with_buffer(self.api.clock.as_ref(), TOKEN_REFRESH_BUFFER_SECS)
        {
            return Ok(tokens.id_token.clone());
        }

        let refreshed = self.api.refresh(&tokens.refresh_token).await?;
        if refreshed.user_id != self.uid {
            return Err(FirebaseError::ParseError(
                "refreshed token belongs to a different user".to_string(),
            )
            .into());
        }

        *tokens = FirebaseTokens::issued(
            refreshed.id_token,
            refreshed.refresh_token,
            &refreshed.expires_in,
            self.api.clock.as_ref(),
        )?;
        debug!(forced = force_refresh, "Refreshed ID token");

        Ok(tokens.id_token.clone())
    }
}

impl fmt::Debug for FirebaseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseSession")
            .field("uid", &self.uid)
            .field("has_email", &self.email.is_some())
            .finish_non_exhaustive()
    }
}

type Listeners = Arc<Mutex<HashMap<Uuid, SessionListener>>>;

/// Firebase Auth identity provider
///
/// Implements `IdentityProvider` over the Identity Toolkit and Secure Token
/// REST APIs.
///
/// # Features
///
/// - Email/password sign-in and account creation
/// - Account deletion with the session's own ID token
/// - Automatic ID token refresh five minutes before expiry
/// - Listener fan-out on every session change
///
/// Sign-out is local: Firebase has no endpoint to revoke a single session,
/// so the tokens are simply dropped.
///
/// Listeners are invoked synchronously and must not register further
/// listeners from inside the callback.
///
/// # Example
///
/// ```ignore
/// use provider_firebase::{FirebaseConfig, FirebaseIdentityProvider};
///
/// let provider = FirebaseIdentityProvider::new(http_client, FirebaseConfig::from_env()?);
/// let _subscription = provider.on_session_change(Arc::new(|session| {
///     println!("signed in: {}", session.is_some());
/// }));
/// ```
pub struct FirebaseIdentityProvider {
    api: Arc<FirebaseApi>,
    current: RwLock<Option<Arc<FirebaseSession>>>,
    listeners: Listeners,
    /// Serializes session changes with listener registration so every
    /// listener observes changes in order.
    changes: Mutex<()>,
}

impl FirebaseIdentityProvider {
    pub fn new(http_client: Arc<dyn HttpClient>, config: FirebaseConfig) -> Self {
        Self::with_clock(http_client, config, Arc::new(SystemClock))
    }

    /// Create a provider with an injected clock for token expiry checks.
    pub fn with_clock(
        http_client: Arc<dyn HttpClient>,
        config: FirebaseConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api: Arc::new(FirebaseApi {
                http_client,
                config,
                clock,
            }),
            current: RwLock::new(None),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            changes: Mutex::new(()),
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn current(&self) -> Option<Arc<FirebaseSession>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_current(&self, session: Option<Arc<FirebaseSession>>) {
        let _guard = lock(&self.changes);
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session.clone();

        let listeners: Vec<SessionListener> = lock(&self.listeners).values().cloned().collect();
        debug!(listeners = listeners.len(), signed_in = session.is_some(), "Session changed");
        for listener in listeners {
            listener(session.clone().map(shared));
        }
    }

    async fn establish(
        &self,
        method: &str,
        email: &str,
        password: &str,
        policy: Option<RetryPolicy>,
    ) -> Result<SharedSession> {
        let account = self
            .api
            .password_call(method, email, password, policy)
            .await?;
        let session = Arc::new(FirebaseSession::from_account(
            account,
            Arc::clone(&self.api),
        )?);

        self.set_current(Some(Arc::clone(&session)));
        Ok(shared(session))
    }
}

fn shared(session: Arc<FirebaseSession>) -> SharedSession {
    session
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    fn on_session_change(&self, listener: SessionListener) -> SessionSubscription {
        let id = Uuid::new_v4();
        {
            let _guard = lock(&self.changes);
            lock(&self.listeners).insert(id, Arc::clone(&listener));
            listener(self.current().map(shared));
        }

        let listeners = Arc::clone(&self.listeners);
        SessionSubscription::new(move || {
            lock(&listeners).remove(&id);
        })
    }

    fn current_session(&self) -> Option<SharedSession> {
        self.current().map(shared)
    }

    #[instrument(skip_all)]
    async fn sign_in_with_credentials(&self, email: &str, password: &str) -> Result<SharedSession> {
        let session = self
            .establish("signInWithPassword", email, password, None)
            .await?;
        info!(uid = %session.uid(), "Signed in with Firebase");
        Ok(session)
    }

    #[instrument(skip_all)]
    async fn create_account_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SharedSession> {
        let session = self
            .establish("signUp", email, password, Some(RetryPolicy::no_retry()))
            .await?;
        info!(uid = %session.uid(), "Created Firebase account");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.current() {
            info!(uid = %session.uid, "Signed out of Firebase");
        }
        self.set_current(None);
        Ok(())
    }

    #[instrument(skip_all, fields(uid = %session.uid()))]
    async fn delete_account(&self, session: &dyn ProviderSession) -> Result<()> {
        let id_token = session.id_token(false).await?;
        self.api.delete_account(&id_token).await?;
        info!("Deleted Firebase account");

        let signed_in_as_deleted = self
            .current()
            .map(|current| current.uid == session.uid())
            .unwrap_or(false);
        if signed_in_as_deleted {
            self.set_current(None);
        }
        Ok(())
    }
}

impl fmt::Debug for FirebaseIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseIdentityProvider")
            .field("config", &self.api.config)
            .field("current", &self.current())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
