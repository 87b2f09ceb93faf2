//! # Core Configuration Module
//!
//! Provides configuration management for the auth session core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all collaborators and settings the session core needs.
//! It enforces fail-fast validation so a missing identity provider or a
//! malformed backend URL is reported before anything starts listening.
//!
//! ## Required Dependencies
//!
//! - `IdentityProvider` - Credential sign-in/sign-up and session notifications
//! - Backend base URL - Where `auth/login` and `auth/signup` live
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - HTTP operations (desktop default: reqwest)
//!
//! When the `desktop-shims` feature is enabled, the reqwest-based
//! `HttpClient` is injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .identity_provider(Arc::new(my_provider))
//!     .backend_url("https://api.example.com/")
//!     .request_timeout(std::time::Duration::from_secs(10))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Environment
//!
//! [`BackendConfig::from_env`] reads `AUTH_BACKEND_URL` and, optionally,
//! `AUTH_REQUEST_TIMEOUT_SECS`.

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{HttpClient, IdentityProvider};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Environment variable holding the backend base URL.
pub const BACKEND_URL_ENV: &str = "AUTH_BACKEND_URL";

/// Environment variable overriding the per-call backend timeout, in seconds.
pub const REQUEST_TIMEOUT_ENV: &str = "AUTH_REQUEST_TIMEOUT_SECS";

/// Default upper bound for a single backend call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Location of the application backend and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    base_url: Url,
    /// Upper bound applied to each backend call on top of the HTTP client's own timeout
    pub request_timeout: Duration,
}

impl BackendConfig {
    /// Parses `base_url` and normalizes it so relative endpoints resolve
    /// beneath it (`https://host/api` behaves like `https://host/api/`).
    pub fn new(base_url: &str) -> Result<Self> {
        let mut url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid backend URL '{}': {}", base_url, e)))?;

        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Backend URL must be an absolute http(s) URL, got '{}'",
                base_url
            )));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self {
            base_url: url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Loads the backend location from `AUTH_BACKEND_URL`.
    ///
    /// `AUTH_REQUEST_TIMEOUT_SECS` overrides the default timeout when set.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(BACKEND_URL_ENV).map_err(|_| {
            Error::Config(format!(
                "{} is not set. Point it at the backend base URL.",
                BACKEND_URL_ENV
            ))
        })?;

        let mut config = Self::new(&base_url)?;

        if let Ok(raw) = std::env::var(REQUEST_TIMEOUT_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    REQUEST_TIMEOUT_ENV, raw
                ))
            })?;
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Normalized base URL (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves an endpoint path such as `auth/login` against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid endpoint '{}': {}", path, e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout > MAX_REQUEST_TIMEOUT {
            return Err(Error::Config(
                "Request timeout exceeds maximum of 300 seconds".to_string(),
            ));
        }

        Ok(())
    }
}

/// Core configuration for the auth session core.
///
/// This struct holds all dependencies and settings required to initialize
/// the session manager. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Identity provider owning user credentials (required)
    pub identity_provider: Arc<dyn IdentityProvider>,

    /// HTTP client used for backend calls (desktop default available)
    pub http_client: Arc<dyn HttpClient>,

    /// Backend location and per-call timeout
    pub backend: BackendConfig,

    /// Capacity of the event bus ring buffer
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("identity_provider", &"IdentityProvider { ... }")
            .field("http_client", &"HttpClient { ... }")
            .field("backend", &self.backend)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Backend timeout is within bounds
    /// - Event buffer size is reasonable (> 0 and <= 10,000)
    pub fn validate(&self) -> Result<()> {
        self.backend.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > 10_000 {
            return Err(Error::Config(
                "Event buffer size exceeds maximum of 10,000".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::try_with_timeout(timeout)
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for backend verification. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Other hosts: inject a platform-native HTTP client."
            .to_string(),
    })
}

fn identity_provider_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "IdentityProvider".to_string(),
        message: "IdentityProvider implementation is required for sign-in and session \
                 notifications. Enable the 'firebase' feature of core-service or inject \
                 your own provider with .identity_provider()."
            .to_string(),
    }
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then
/// call [`build()`](CoreConfigBuilder::build) to create the final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    http_client: Option<Arc<dyn HttpClient>>,
    backend_url: Option<String>,
    backend: Option<BackendConfig>,
    request_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the identity provider implementation (required).
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the backend base URL. Parsed and validated in [`build`](Self::build).
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .backend_url("https://api.example.com/v1");
    /// ```
    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }

    /// Sets a fully formed backend configuration, e.g. from
    /// [`BackendConfig::from_env`]. Takes precedence over `backend_url`.
    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the per-call backend timeout.
    ///
    /// Default: 30 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - The identity provider is missing
    /// - The backend URL is missing or malformed
    /// - No HTTP client was injected and no default is available
    /// - Configuration values are out of range
    pub fn build(self) -> Result<CoreConfig> {
        let identity_provider = self
            .identity_provider
            .ok_or_else(identity_provider_missing_error)?;

        let mut backend = match (self.backend, self.backend_url) {
            (Some(backend), _) => backend,
            (None, Some(url)) => BackendConfig::new(&url)?,
            (None, None) => {
                return Err(Error::Config(
                    "Backend URL is required. Use .backend_url() to set it.".to_string(),
                ))
            }
        };

        if let Some(timeout) = self.request_timeout {
            backend = backend.with_request_timeout(timeout);
        }

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(backend.request_timeout)?,
        };

        let config = CoreConfig {
            identity_provider,
            http_client,
            backend,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
