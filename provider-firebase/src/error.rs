//! Error types for the Firebase provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Firebase provider errors
#[derive(Error, Debug)]
pub enum FirebaseError {
    /// Firebase understood the request and refused it
    #[error("Firebase rejected the request ({code}): {message}")]
    Api { code: String, message: String },

    /// Non-success status without a Firebase error body
    #[error("Firebase returned HTTP {status}")]
    HttpStatus { status: u16 },

    /// Failed to parse API response
    #[error("Failed to parse Firebase response: {0}")]
    ParseError(String),

    /// Missing or invalid provider configuration
    #[error("Invalid Firebase configuration: {0}")]
    Config(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Firebase operations
pub type Result<T> = std::result::Result<T, FirebaseError>;

impl FirebaseError {
    /// Builds an [`FirebaseError::Api`] from the `error.message` field of a
    /// Firebase error body.
    ///
    /// Firebase packs the machine code and an optional description into one
    /// string: `"WEAK_PASSWORD : Password should be at least 6 characters"`.
    pub fn from_api_message(raw: &str) -> Self {
        match raw.split_once(" : ") {
            Some((code, detail)) => FirebaseError::Api {
                code: code.trim().to_string(),
                message: detail.trim().to_string(),
            },
            None => FirebaseError::Api {
                code: raw.trim().to_string(),
                message: raw.trim().to_string(),
            },
        }
    }

    /// Firebase error code, when the failure came from the API.
    pub fn code(&self) -> Option<&str> {
        match self {
            FirebaseError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<FirebaseError> for BridgeError {
    fn from(error: FirebaseError) -> Self {
        match error {
            FirebaseError::Api { code, message } => BridgeError::Rejected { code, message },
            FirebaseError::HttpStatus { status } if (400..500).contains(&status) => {
                BridgeError::Rejected {
                    code: format!("HTTP_{}", status),
                    message: format!("Firebase returned HTTP {}", status),
                }
            }
            FirebaseError::HttpStatus { status } => {
                BridgeError::OperationFailed(format!("Firebase returned HTTP {}", status))
            }
            FirebaseError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            FirebaseError::Config(msg) => BridgeError::NotAvailable(msg),
            FirebaseError::BridgeError(e) => e,
        }
    }
}
