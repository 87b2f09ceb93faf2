//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (identity provider,
//! HTTP client) into a running [`SessionManager`]. Desktop apps typically
//! enable the `desktop-shims` feature (which supplies a `reqwest` based
//! `HttpClient`), and the `firebase` feature adds a Firebase-backed identity
//! provider together with [`bootstrap_from_env`].
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .identity_provider(provider)
//!     .backend_url("https://api.example.com/")
//!     .build()?;
//!
//! let core = CoreService::bootstrap(config).await?;
//! let state = core.auth().wait_until_loaded().await;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use core_auth::{BackendClient, SessionManager};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, Receiver};
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
///
/// Owns the event bus and the session manager. Cloning shares both.
#[derive(Clone)]
pub struct CoreService {
    auth: SessionManager,
    events: EventBus,
}

impl CoreService {
    /// Validates `config`, builds the session manager and starts listening
    /// to the identity provider.
    #[instrument(skip(config), fields(backend = %config.backend.base_url()))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer_size);
        let backend = BackendClient::new(config.http_client, config.backend);
        let auth = SessionManager::new(config.identity_provider, backend, events.clone());
        auth.start().await?;

        info!("Core service started");
        Ok(Self { auth, events })
    }

    /// The session manager driving login, signup and logout.
    pub fn auth(&self) -> &SessionManager {
        &self.auth
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Event stream with filtering helpers.
    pub fn event_stream(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Detaches the provider listener. In-flight work finishes without
    /// touching the session state.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.auth.shutdown().await;
        info!("Core service stopped");
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("running", &self.auth.is_running())
            .field("state", &self.auth.state())
            .finish()
    }
}

/// Bootstraps a desktop core against Firebase and the configured backend.
///
/// Reads `FIREBASE_API_KEY` (plus `FIREBASE_AUTH_EMULATOR_HOST` when set),
/// `AUTH_BACKEND_URL` and `AUTH_REQUEST_TIMEOUT_SECS`.
#[cfg(all(
    feature = "firebase",
    feature = "desktop-shims",
    not(target_arch = "wasm32")
))]
pub async fn bootstrap_from_env() -> Result<CoreService> {
    use bridge_desktop::ReqwestHttpClient;
    use core_runtime::config::BackendConfig;
    use provider_firebase::{FirebaseConfig, FirebaseIdentityProvider};
    use std::sync::Arc;

    let backend = BackendConfig::from_env()?;
    let http_client = Arc::new(
        ReqwestHttpClient::try_with_timeout(backend.request_timeout)
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?,
    );
    let provider = FirebaseIdentityProvider::new(http_client.clone(), FirebaseConfig::from_env()?);

    let config = CoreConfig::builder()
        .identity_provider(Arc::new(provider))
        .http_client(http_client)
        .backend(backend)
        .build()?;

    CoreService::bootstrap(config).await
}
