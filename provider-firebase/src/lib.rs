//! # Firebase Identity Provider
//!
//! Implements the `IdentityProvider` bridge trait on top of the Firebase
//! Authentication REST API.
//!
//! ## Overview
//!
//! This crate provides:
//! - Email/password sign-in and account creation (`accounts:signInWithPassword`,
//!   `accounts:signUp`)
//! - Account deletion (`accounts:delete`)
//! - ID token refresh through the Secure Token API
//! - Session change notifications for every sign-in, sign-out and deletion
//!
//! All HTTP traffic goes through the host's `HttpClient`, so the provider runs
//! wherever a bridge implementation exists.
//!
//! ## Example
//!
//! ```ignore
//! use provider_firebase::{FirebaseConfig, FirebaseIdentityProvider};
//!
//! let config = FirebaseConfig::from_env()?;
//! let provider = FirebaseIdentityProvider::new(http_client, config);
//! let session = provider.sign_in_with_credentials("a@b.com", "secret").await?;
//! ```

pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use config::FirebaseConfig;
pub use error::{FirebaseError, Result};
pub use provider::{FirebaseIdentityProvider, FirebaseSession};
