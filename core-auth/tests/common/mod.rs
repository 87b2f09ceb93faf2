//! In-memory collaborators for session manager tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::identity::{
    IdentityProvider, ProviderSession, SessionListener, SessionSubscription, SharedSession,
};
use bytes::Bytes;
use core_auth::{BackendClient, SessionManager};
use core_runtime::config::BackendConfig;
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const BACKEND_URL: &str = "https://api.example.com/";

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeSession {
    uid: String,
    email: Option<String>,
    token_fails: bool,
}

impl FakeSession {
    pub fn shared(uid: &str, email: &str) -> SharedSession {
        Arc::new(Self {
            uid: uid.to_string(),
            email: Some(email.to_string()),
            token_fails: false,
        })
    }

    pub fn without_token(uid: &str) -> SharedSession {
        Arc::new(Self {
            uid: uid.to_string(),
            email: None,
            token_fails: true,
        })
    }
}

/// Token the fake session hands out: `fresh-<uid>` when forced, `cached-<uid>` otherwise.
pub fn token_for(uid: &str, force_refresh: bool) -> String {
    if force_refresh {
        format!("fresh-{}", uid)
    } else {
        format!("cached-{}", uid)
    }
}

#[async_trait]
impl ProviderSession for FakeSession {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    async fn id_token(&self, force_refresh: bool) -> Result<String> {
        if self.token_fails {
            return Err(BridgeError::OperationFailed("token refresh failed".into()));
        }
        Ok(token_for(&self.uid, force_refresh))
    }
}

#[derive(Default)]
pub struct FakeProvider {
    current: Mutex<Option<SharedSession>>,
    listeners: Arc<Mutex<HashMap<u64, SessionListener>>>,
    next_listener: AtomicU64,
    /// email -> uid for sign-in and account creation
    accounts: Mutex<HashMap<String, String>>,
    deleted: Mutex<Vec<String>>,
    pub fail_sign_in: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_sign_out: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_session(session: SharedSession) -> Arc<Self> {
        let provider = Self::default();
        *provider.current.lock().unwrap() = Some(session);
        Arc::new(provider)
    }

    pub fn add_account(&self, email: &str, uid: &str) {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), uid.to_string());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn has_session(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    pub fn deleted_accounts(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Simulates a provider-side session change (token revoked, other tab, ...).
    pub fn change_session(&self, session: Option<SharedSession>) {
        *self.current.lock().unwrap() = session.clone();
        self.notify(session);
    }

    fn notify(&self, session: Option<SharedSession>) {
        let listeners: Vec<SessionListener> =
            self.listeners.lock().unwrap().values().cloned().collect();
        for listener in listeners {
            listener(session.clone());
        }
    }

    fn uid_for(&self, email: &str) -> String {
        self.accounts
            .lock()
            .unwrap()
            .get(email)
            .cloned()
            .unwrap_or_else(|| format!("uid-{}", email))
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn on_session_change(&self, listener: SessionListener) -> SessionSubscription {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap()
            .insert(id, Arc::clone(&listener));

        let current = self.current.lock().unwrap().clone();
        listener(current);

        let listeners = Arc::clone(&self.listeners);
        SessionSubscription::new(move || {
            listeners.lock().unwrap().remove(&id);
        })
    }

    fn current_session(&self) -> Option<SharedSession> {
        self.current.lock().unwrap().clone()
    }

    async fn sign_in_with_credentials(&self, email: &str, _password: &str) -> Result<SharedSession> {
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(BridgeError::Rejected {
                code: "INVALID_PASSWORD".into(),
                message: "wrong password".into(),
            });
        }
        let session = FakeSession::shared(&self.uid_for(email), email);
        self.change_session(Some(Arc::clone(&session)));
        Ok(session)
    }

    async fn create_account_with_credentials(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<SharedSession> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BridgeError::Rejected {
                code: "EMAIL_EXISTS".into(),
                message: "account exists".into(),
            });
        }
        let session = FakeSession::shared(&self.uid_for(email), email);
        self.change_session(Some(Arc::clone(&session)));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("sign-out failed".into()));
        }
        self.change_session(None);
        Ok(())
    }

    async fn delete_account(&self, session: &dyn ProviderSession) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("delete failed".into()));
        }
        self.deleted.lock().unwrap().push(session.uid().to_string());
        self.change_session(None);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum Reply {
    Status(u16, String),
    TransportError,
}

impl Reply {
    pub fn user(uid: &str, email: &str, username: &str) -> Self {
        Reply::Status(
            200,
            serde_json::json!({"uid": uid, "email": email, "username": username}).to_string(),
        )
    }
}

/// Scripted backend: `auth/login` replies are chosen by bearer token,
/// `auth/signup` has one reply. Unknown tokens get `401`.
#[derive(Default)]
pub struct FakeBackend {
    login_replies: Mutex<HashMap<String, Reply>>,
    signup_reply: Mutex<Option<Reply>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_login(&self, token: &str, reply: Reply) {
        self.login_replies
            .lock()
            .unwrap()
            .insert(token.to_string(), reply);
    }

    /// Accept both the forced and the cached token of `uid`.
    pub fn accept_user(&self, uid: &str, email: &str, username: &str) {
        self.on_login(&token_for(uid, true), Reply::user(uid, email, username));
        self.on_login(&token_for(uid, false), Reply::user(uid, email, username));
    }

    pub fn on_signup(&self, reply: Reply) {
        *self.signup_reply.lock().unwrap() = Some(reply);
    }

    /// Holds `auth/login` calls carrying `token` until the returned gate is notified.
    pub fn gate(&self, token: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(token.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|req| req.url.ends_with(path))
            .collect()
    }
}

fn bearer(request: &HttpRequest) -> Option<String> {
    request
        .headers
        .get("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[async_trait]
impl HttpClient for FakeBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let reply = if request.url.ends_with("auth/signup") {
            self.signup_reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Reply::Status(500, "no signup reply".into()))
        } else {
            let token = bearer(&request).unwrap_or_default();
            let gate = self.gates.lock().unwrap().get(&token).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.login_replies
                .lock()
                .unwrap()
                .get(&token)
                .cloned()
                .unwrap_or(Reply::Status(401, "unknown token".into()))
        };

        match reply {
            Reply::Status(status, body) => Ok(HttpResponse {
                status,
                headers: HashMap::new(),
                body: Bytes::from(body),
            }),
            Reply::TransportError => Err(BridgeError::OperationFailed("connection reset".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn manager(provider: Arc<FakeProvider>, backend: Arc<FakeBackend>) -> SessionManager {
    manager_with_bus(provider, backend, EventBus::new(64))
}

pub fn manager_with_bus(
    provider: Arc<FakeProvider>,
    backend: Arc<FakeBackend>,
    event_bus: EventBus,
) -> SessionManager {
    let config = BackendConfig::new(BACKEND_URL).unwrap();
    let client = BackendClient::new(backend, config);
    SessionManager::new(provider, client, event_bus)
}

/// Receives events until one matches, failing after two seconds.
pub async fn wait_for_event<F>(events: &mut Receiver<CoreEvent>, mut predicate: F) -> CoreEvent
where
    F: FnMut(&CoreEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event bus closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub async fn loaded(manager: &SessionManager) -> core_auth::SessionState {
    tokio::time::timeout(Duration::from_secs(2), manager.wait_until_loaded())
        .await
        .expect("session never finished loading")
}
