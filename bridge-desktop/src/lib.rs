//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides the desktop `HttpClient` used to talk to the
//! application backend and to REST-based identity providers:
//! - `HttpClient` using `reqwest` with pooled connections, rustls and
//!   exponential backoff on transient failures
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use bridge_traits::HttpClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
//!
//!     // Use in core configuration
//! }
//! ```

mod http;

pub use http::ReqwestHttpClient;
