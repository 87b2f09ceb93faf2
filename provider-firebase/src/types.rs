//! Firebase Auth REST API request and response types

use bridge_traits::time::Clock;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FirebaseError, Result};

/// Body for `accounts:signInWithPassword` and `accounts:signUp`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

/// Body for `accounts:delete`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountRequest<'a> {
    pub id_token: &'a str,
}

/// Form body for the Secure Token API.
#[derive(Serialize)]
pub struct RefreshTokenRequest<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
}

impl<'a> RefreshTokenRequest<'a> {
    pub fn new(refresh_token: &'a str) -> Self {
        Self {
            grant_type: "refresh_token",
            refresh_token,
        }
    }
}

/// Response of `accounts:signInWithPassword` and `accounts:signUp`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    /// Lifetime of `id_token` in seconds, sent as a string.
    pub expires_in: String,
}

/// Response of the Secure Token API (snake_case, unlike the Identity Toolkit).
#[derive(Deserialize)]
pub struct RefreshTokenResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
    pub user_id: String,
}

/// `{"error": {"code": 400, "message": "EMAIL_EXISTS"}}`
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    pub message: String,
}

/// Token pair held by a signed-in session.
#[derive(Clone)]
pub struct FirebaseTokens {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl FirebaseTokens {
    pub fn issued(
        id_token: String,
        refresh_token: String,
        expires_in: &str,
        clock: &dyn Clock,
    ) -> Result<Self> {
        let seconds: i64 = expires_in
            .trim()
            .parse()
            .map_err(|_| FirebaseError::ParseError(format!("invalid expiresIn: {}", expires_in)))?;
        let expires_at = Duration::try_seconds(seconds)
            .and_then(|lifetime| clock.now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                FirebaseError::ParseError(format!("expiresIn out of range: {}", expires_in))
            })?;

        Ok(Self {
            id_token,
            refresh_token,
            expires_at,
        })
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        clock.now() >= self.expires_at
    }

    /// True when the ID token expires within `buffer_secs`.
    pub fn is_expired_with_buffer(&self, clock: &dyn Clock, buffer_secs: i64) -> bool {
        Duration::try_seconds(buffer_secs)
            .and_then(|buffer| clock.now().checked_add_signed(buffer))
            .map_or(true, |deadline| deadline >= self.expires_at)
    }
}

impl fmt::Debug for FirebaseTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseTokens")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
