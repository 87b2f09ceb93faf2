//! # Session Manager
//!
//! Keeps the application's "current user" in step with the identity provider
//! and the backend.
//!
//! ## Overview
//!
//! The `SessionManager` owns the [`SessionStore`] and is the only component
//! that writes to it. It does so from two directions:
//!
//! - **Passive reconciliation**: after [`start`](SessionManager::start), every
//!   provider session change is queued to a worker task which force-refreshes
//!   the identity token, calls `POST auth/login`, and commits the result.
//! - **Explicit operations**: [`login`](SessionManager::login),
//!   [`signup`](SessionManager::signup) and [`logout`](SessionManager::logout)
//!   run the provider phase, then the backend phase, then commit.
//!
//! A signup whose backend phase fails deletes the freshly created provider
//! account again so no orphaned credentials remain.
//!
//! ## Ordering
//!
//! Each attempt draws a generation when its reconciliation phase begins
//! (passive events: when the provider reports the change; explicit calls:
//! once the provider call has returned). The store discards any commit whose
//! generation is not newer than the last applied one, so results are ordered
//! by initiation, not by completion.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{BackendClient, SessionManager};
//! use core_runtime::config::BackendConfig;
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//! # use bridge_traits::{HttpClient, IdentityProvider};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let provider: Arc<dyn IdentityProvider> = todo!();
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! let backend = BackendClient::new(http_client, BackendConfig::new("https://api.example.com")?);
//! let manager = SessionManager::new(provider, backend, EventBus::new(100));
//!
//! manager.start().await?;
//! let state = manager.wait_until_loaded().await;
//! println!("signed in: {}", state.is_authenticated());
//!
//! let user = manager.login("alice@example.com", "hunter2").await?;
//! println!("welcome {}", user);
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::backend::BackendClient;
use crate::error::{AuthError, Result};
use crate::state::{Generation, SessionStore, Transition};
use crate::types::{ApplicationUser, SessionState, SignupRequest};
use bridge_traits::identity::{
    IdentityProvider, SessionListener, SessionSubscription, SharedSession,
};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// A provider session change, tagged with the generation drawn when it arrived.
struct SessionChange {
    generation: Generation,
    session: Option<SharedSession>,
}

/// Live listener registration plus the task draining its queue.
struct ListenerHandle {
    subscription: SessionSubscription,
    worker: JoinHandle<()>,
}

impl ListenerHandle {
    fn detach(self) {
        self.subscription.unsubscribe();
        self.worker.abort();
    }
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    backend: BackendClient,
    store: Arc<SessionStore>,
    event_bus: EventBus,
    listener: Mutex<Option<ListenerHandle>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.store.close_now();
        if let Some(handle) = self.listener.get_mut().take() {
            debug!("Detaching session listener on drop");
            handle.detach();
        }
    }
}

/// Handle to the session reconciliation core.
///
/// Cloning is cheap; all clones share one state cell and one provider
/// listener. Dropping the last clone has the same effect as
/// [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Creates a manager. Nothing is registered with the provider until
    /// [`start`](Self::start) is called.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        backend: BackendClient,
        event_bus: EventBus,
    ) -> Self {
        let store = Arc::new(SessionStore::new(event_bus.clone()));
        Self {
            inner: Arc::new(Inner {
                provider,
                backend,
                store,
                event_bus,
                listener: Mutex::new(None),
            }),
        }
    }

    /// Registers the provider session listener.
    ///
    /// The provider reports its current session immediately, so the first
    /// reconciliation starts right away and `is_loading` turns `false` once
    /// it completes. Calling `start` again while running is a no-op.
    ///
    /// # Errors
    ///
    /// - `AuthError::ShutDown` - the manager has already been shut down
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut listener = self.inner.listener.lock().await;
        if self.inner.store.is_closed() {
            return Err(AuthError::ShutDown);
        }
        if listener.is_some() {
            debug!("Session listener already registered");
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel::<SessionChange>();

        let worker = tokio::spawn(run_reconciler(
            rx,
            Arc::clone(&self.inner.store),
            self.inner.backend.clone(),
            self.inner.event_bus.clone(),
        ));

        let store = Arc::clone(&self.inner.store);
        let callback: SessionListener = Arc::new(move |session: Option<SharedSession>| {
            let change = SessionChange {
                generation: store.begin(),
                session,
            };
            if tx.send(change).is_err() {
                debug!("Session change arrived after the reconciler stopped");
            }
        });

        let subscription = self.inner.provider.on_session_change(callback);
        *listener = Some(ListenerHandle {
            subscription,
            worker,
        });

        info!("Session listener registered");
        Ok(())
    }

    /// Signs in with email and password, then confirms the user with the backend.
    ///
    /// This method:
    /// 1. Signs in with the identity provider
    /// 2. Obtains the session's identity token (cached token is fine)
    /// 3. Calls `POST auth/login` with the token
    /// 4. Commits the backend's user record
    ///
    /// `is_loading` turns `false` once the backend phase finishes, whatever its
    /// outcome. A provider failure leaves the state untouched.
    ///
    /// # Errors
    ///
    /// - `AuthError::ProviderLogin` - the provider refused the credentials
    /// - `AuthError::TokenUnavailable` - the session could not produce a token
    /// - `AuthError::BackendRejected` / `BackendUnavailable` / `InvalidResponse`
    /// - `AuthError::Superseded` - a newer attempt committed a different user first
    /// - `AuthError::ShutDown`
    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<ApplicationUser> {
        self.ensure_running()?;
        self.emit(AuthEvent::SigningIn {
            operation: "login".to_string(),
        });

        let session = match self
            .inner
            .provider
            .sign_in_with_credentials(email, password)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                let err = AuthError::ProviderLogin(e.to_string());
                return Err(self.report("login", None, err));
            }
        };

        let uid = session.uid().to_string();
        let generation = self.inner.store.begin();
        debug!(%generation, uid = %uid, "Provider sign-in succeeded, verifying with backend");

        let verified = match session.id_token(false).await {
            Ok(token) => self.inner.backend.login(&token).await,
            Err(e) => Err(AuthError::TokenUnavailable(e.to_string())),
        };

        match verified {
            Ok(user) => {
                self.commit_explicit(generation, Transition::SignedIn(user.clone()), &user)
                    .await?;
                info!(uid = %user.uid, "Login completed");
                Ok(user)
            }
            Err(err) => {
                self.inner.store.finish_loading().await;
                Err(self.report("login", Some(uid), err))
            }
        }
    }

    /// Creates a provider account and registers it with the backend.
    ///
    /// This method:
    /// 1. Creates the account with the identity provider
    /// 2. Calls `POST auth/signup` with `{uid, email, username}`
    /// 3. On success, commits the backend's user record
    /// 4. On backend failure, deletes the provider account again
    ///
    /// `is_loading` is not touched.
    ///
    /// # Errors
    ///
    /// - `AuthError::ProviderSignup` - the provider refused to create the account;
    ///   the backend was not contacted
    /// - `AuthError::SignupRolledBack` - the backend phase failed and the provider
    ///   account was deleted
    /// - `AuthError::Compensation` - the backend phase failed and the provider
    ///   account could not be deleted
    /// - `AuthError::Superseded`, `AuthError::ShutDown`
    #[instrument(skip(self, email, password))]
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<ApplicationUser> {
        self.ensure_running()?;
        self.emit(AuthEvent::SigningIn {
            operation: "signup".to_string(),
        });

        let session = match self
            .inner
            .provider
            .create_account_with_credentials(email, password)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                let err = AuthError::ProviderSignup(e.to_string());
                return Err(self.report("signup", None, err));
            }
        };

        let uid = session.uid().to_string();
        let generation = self.inner.store.begin();
        let request = SignupRequest {
            uid: uid.clone(),
            email: session.email().unwrap_or(email).to_string(),
            username: username.to_string(),
        };

        match self.inner.backend.signup(&request).await {
            Ok(user) => {
                self.commit_explicit(generation, Transition::SignedUp(user.clone()), &user)
                    .await?;
                info!(uid = %user.uid, "Signup completed");
                Ok(user)
            }
            Err(backend_err) => self.roll_back_signup(session, backend_err).await,
        }
    }

    async fn roll_back_signup(
        &self,
        session: SharedSession,
        backend_err: AuthError,
    ) -> Result<ApplicationUser> {
        let uid = session.uid().to_string();
        warn!(uid = %uid, error = %backend_err, "Backend signup failed, deleting provider account");

        match self.inner.provider.delete_account(session.as_ref()).await {
            Ok(()) => {
                let reason = backend_err.to_string();
                info!(uid = %uid, "Provider account deleted after failed signup");
                self.emit(AuthEvent::SignupRolledBack {
                    uid: uid.clone(),
                    reason: reason.clone(),
                });
                let err = AuthError::SignupRolledBack {
                    uid: uid.clone(),
                    reason,
                };
                Err(self.report("signup", Some(uid), err))
            }
            Err(e) => {
                let err = AuthError::Compensation {
                    uid: uid.clone(),
                    backend: backend_err.to_string(),
                    reason: e.to_string(),
                };
                Err(self.report("signup", Some(uid), err))
            }
        }
    }

    /// Signs out with the provider and clears the local user.
    ///
    /// The local state is cleared even when the provider call fails. The
    /// backend is not contacted.
    ///
    /// # Errors
    ///
    /// - `AuthError::ProviderSignOut` - the provider call failed (state was
    ///   still cleared)
    /// - `AuthError::ShutDown`
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.ensure_running()?;

        let signed_out = self.inner.provider.sign_out().await;
        let generation = self.inner.store.begin();

        match self
            .inner
            .store
            .commit(generation, Transition::SignedOut)
            .await
        {
            Ok(()) => info!("Local session cleared"),
            // A newer attempt already decided the state.
            Err(AuthError::Superseded { .. }) => {
                debug!(%generation, "Logout commit superseded")
            }
            Err(e) => return Err(e),
        }

        signed_out.map_err(|e| {
            let err = AuthError::ProviderSignOut(e.to_string());
            self.report("logout", None, err)
        })
    }

    /// Detaches the provider listener and stops the reconciler.
    ///
    /// Any attempt still in flight completes without touching the state.
    /// Idempotent.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.inner.store.close().await;
        let handle = self.inner.listener.lock().await.take();
        if let Some(handle) = handle {
            handle.detach();
            info!("Session listener detached");
        }
    }

    /// The backend-confirmed user, if any.
    pub fn authenticated_user(&self) -> Option<ApplicationUser> {
        self.inner.store.snapshot().authenticated_user
    }

    /// `true` until the first provider session resolution completes.
    pub fn is_loading(&self) -> bool {
        self.inner.store.snapshot().is_loading
    }

    pub fn state(&self) -> SessionState {
        self.inner.store.snapshot()
    }

    /// Receiver that observes every committed state change.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.store.subscribe()
    }

    /// Waits until `is_loading` is `false` and returns that state.
    pub async fn wait_until_loaded(&self) -> SessionState {
        let mut rx = self.watch();
        let loaded = match rx.wait_for(|state| !state.is_loading).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        loaded.unwrap_or_else(|| self.state())
    }

    pub fn is_running(&self) -> bool {
        !self.inner.store.is_closed()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    fn ensure_running(&self) -> Result<()> {
        if self.inner.store.is_closed() {
            return Err(AuthError::ShutDown);
        }
        Ok(())
    }

    /// Commits an explicit call's result. Losing to a newer attempt that
    /// committed the same user still counts as success.
    async fn commit_explicit(
        &self,
        generation: Generation,
        transition: Transition,
        user: &ApplicationUser,
    ) -> Result<()> {
        match self.inner.store.commit(generation, transition).await {
            Ok(()) => Ok(()),
            Err(AuthError::Superseded { .. })
                if self
                    .authenticated_user()
                    .is_some_and(|current| current.uid == user.uid) =>
            {
                debug!(%generation, uid = %user.uid, "Newer attempt already committed this user");
                Ok(())
            }
            Err(e) => {
                warn!(%generation, error = %e, "Result not applied");
                Err(e)
            }
        }
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.inner.event_bus.emit(CoreEvent::Auth(event));
    }

    /// Logs `err`, publishes it on the event bus and hands it back.
    fn report(&self, operation: &str, uid: Option<String>, err: AuthError) -> AuthError {
        publish_error(&self.inner.event_bus, operation, uid, &err);
        err
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("backend", &self.inner.backend)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

fn publish_error(event_bus: &EventBus, operation: &str, uid: Option<String>, err: &AuthError) {
    if err.is_recoverable() {
        warn!(operation, uid = ?uid, error = %err, "Authentication operation failed");
    } else {
        error!(operation, uid = ?uid, error = %err, "Authentication operation failed");
    }

    let _ = event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
        uid,
        operation: operation.to_string(),
        message: err.to_string(),
        recoverable: err.is_recoverable(),
    }));
}

/// Drains provider session changes one at a time.
async fn run_reconciler(
    mut rx: mpsc::UnboundedReceiver<SessionChange>,
    store: Arc<SessionStore>,
    backend: BackendClient,
    event_bus: EventBus,
) {
    while let Some(change) = rx.recv().await {
        reconcile(&store, &backend, &event_bus, change).await;
    }
    debug!("Session reconciler stopped");
}

#[instrument(skip_all, fields(generation = %change.generation))]
async fn reconcile(
    store: &SessionStore,
    backend: &BackendClient,
    event_bus: &EventBus,
    change: SessionChange,
) {
    let SessionChange {
        generation,
        session,
    } = change;

    let Some(session) = session else {
        debug!("Provider reports no session");
        if let Err(e) = store.commit(generation, Transition::Cleared).await {
            debug!(error = %e, "Session clear not applied");
        }
        return;
    };

    let uid = session.uid().to_string();
    let verified = match session.id_token(true).await {
        Ok(token) => backend.login(&token).await,
        Err(e) => Err(AuthError::TokenUnavailable(e.to_string())),
    };

    match verified {
        Ok(user) => match store.commit(generation, Transition::Restored(user)).await {
            Ok(()) => info!(uid = %uid, "Provider session confirmed by backend"),
            Err(e) => debug!(uid = %uid, error = %e, "Reconciled session not applied"),
        },
        Err(err) => {
            store.finish_loading().await;
            publish_error(event_bus, "reconcile", Some(uid), &err);
        }
    }
}
