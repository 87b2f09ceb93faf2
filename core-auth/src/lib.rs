//! # Authentication Module
//!
//! Session reconciliation between an identity provider and the application backend.
//!
//! ## Overview
//!
//! This module keeps a single "current user" view consistent while provider
//! and backend calls are in flight. A user counts as authenticated only after
//! the backend has confirmed the provider's identity token.
//!
//! ## Features
//!
//! - Passive reconciliation of provider session changes
//! - Email/password login, signup and logout
//! - Compensating deletion of the provider account when backend signup fails
//! - Generation-ordered commits so stale results never overwrite newer ones
//! - `tokio::sync::watch` state surface plus auth events on the runtime event bus

pub mod backend;
pub mod error;
pub mod manager;
pub mod state;
pub mod types;

pub use backend::BackendClient;
pub use error::{AuthError, Result};
pub use manager::SessionManager;
pub use state::{Generation, SessionStore, Transition};
pub use types::{ApplicationUser, SessionState, SignupRequest};
