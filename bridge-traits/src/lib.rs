//! # Host Bridge Traits
//!
//! Capability traits that the authentication core requires from its host.
//!
//! ## Overview
//!
//! This crate defines the contract between the session core and the
//! collaborators it does not own. Each trait represents a capability that
//! must be supplied by the host application or an adapter crate.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with bearer auth and retry
//!
//! ### Identity
//! - [`IdentityProvider`](identity::IdentityProvider) - Credential sign-in, sign-up,
//!   sign-out, account deletion, session change notifications
//! - [`ProviderSession`](identity::ProviderSession) - A signed-in provider account
//!   able to mint identity tokens
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Implementations
//!
//! | Capability         | Implementation Crate | Type                       |
//! |--------------------|----------------------|----------------------------|
//! | `HttpClient`       | `bridge-desktop`     | `ReqwestHttpClient`        |
//! | `IdentityProvider` | `provider-firebase`  | `FirebaseIdentityProvider` |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Adapters
//! should:
//!
//! - Report refusals by the remote side as `BridgeError::Rejected`
//! - Report transport failures as `BridgeError::OperationFailed`
//! - Never include secrets (passwords, tokens) in error messages
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.
//!
//! ## Examples
//!
//! ### Implementing HttpClient
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyHttpClient {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl HttpClient for MyHttpClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         // Implementation
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod identity;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use identity::{
    IdentityProvider, ProviderSession, SessionListener, SessionSubscription, SharedSession,
};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
