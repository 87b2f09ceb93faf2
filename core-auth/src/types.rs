use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The backend's canonical view of a signed-in user.
///
/// Only `uid`, `email` and `username` are interpreted. Any other profile
/// fields the backend returns are kept in [`extra`](Self::extra) and written
/// back out unchanged when the user is serialized.
///
/// # Examples
///
/// ```
/// use core_auth::ApplicationUser;
///
/// let user: ApplicationUser = serde_json::from_str(
///     r#"{"uid":"u1","email":"a@b.com","username":"alice","avatar":"x.png"}"#,
/// ).unwrap();
///
/// assert_eq!(user.uid, "u1");
/// assert_eq!(user.username.as_deref(), Some("alice"));
/// assert_eq!(user.extra["avatar"], "x.png");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationUser {
    /// Provider-assigned identifier, shared by provider and backend
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Profile fields the core does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApplicationUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            username: None,
            extra: Map::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl fmt::Display for ApplicationUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.username {
            Some(username) => write!(f, "{} ({})", username, self.uid),
            None => write!(f, "{}", self.uid),
        }
    }
}

/// Snapshot of the reconciled session.
///
/// `is_loading` starts out `true` and becomes `false` once the first provider
/// session resolution finishes; it never goes back to `true`.
/// `authenticated_user` is only set after the backend confirmed the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub authenticated_user: Option<ApplicationUser>,
    pub is_loading: bool,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.authenticated_user.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            authenticated_user: None,
            is_loading: true,
        }
    }
}

/// Payload of `POST auth/signup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRequest {
    pub uid: String,
    pub email: String,
    pub username: String,
}
