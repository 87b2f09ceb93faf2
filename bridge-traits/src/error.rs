use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The remote side understood the request and refused it
    /// (bad credentials, duplicate account, revoked session).
    #[error("Request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` when the failure is a definitive refusal rather than a
    /// transport or availability problem.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BridgeError::Rejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
