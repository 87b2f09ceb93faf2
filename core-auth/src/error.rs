use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Provider sign-in failed: {0}")]
    ProviderLogin(String),

    #[error("Provider account creation failed: {0}")]
    ProviderSignup(String),

    #[error("Provider sign-out failed: {0}")]
    ProviderSignOut(String),

    #[error("Identity token unavailable: {0}")]
    TokenUnavailable(String),

    #[error("Backend rejected {endpoint} with status {status}")]
    BackendRejected { endpoint: String, status: u16 },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("Signup for {uid} failed at the backend ({backend}) and the provider account could not be deleted: {reason}")]
    Compensation {
        uid: String,
        backend: String,
        reason: String,
    },

    #[error("Signup for {uid} rolled back: {reason}")]
    SignupRolledBack { uid: String, reason: String },

    #[error("Result of attempt {generation} discarded by a newer session update")]
    Superseded { generation: u64 },

    #[error("Session manager has been shut down")]
    ShutDown,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl AuthError {
    /// Whether retrying the same call may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::TokenUnavailable(_)
                | AuthError::BackendUnavailable(_)
                | AuthError::SignupRolledBack { .. }
                | AuthError::Superseded { .. }
                | AuthError::Bridge(BridgeError::OperationFailed(_))
        ) || matches!(self, AuthError::BackendRejected { status, .. } if *status >= 500)
    }
}

impl From<core_runtime::Error> for AuthError {
    fn from(err: core_runtime::Error) -> Self {
        AuthError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(AuthError::BackendUnavailable("timeout".into()).is_recoverable());
        assert!(AuthError::BackendRejected {
            endpoint: "auth/login".into(),
            status: 503
        }
        .is_recoverable());
        assert!(!AuthError::BackendRejected {
            endpoint: "auth/login".into(),
            status: 401
        }
        .is_recoverable());
        assert!(!AuthError::ProviderLogin("INVALID_PASSWORD".into()).is_recoverable());
        assert!(!AuthError::Compensation {
            uid: "u1".into(),
            backend: "status 409".into(),
            reason: "network".into()
        }
        .is_recoverable());
    }

    #[test]
    fn test_messages() {
        let err = AuthError::BackendRejected {
            endpoint: "auth/signup".into(),
            status: 409,
        };
        assert_eq!(
            err.to_string(),
            "Backend rejected auth/signup with status 409"
        );
        assert_eq!(
            AuthError::ShutDown.to_string(),
            "Session manager has been shut down"
        );
    }
}
