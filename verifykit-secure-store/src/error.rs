use thiserror::Error;

/// Errors surfaced by a [`crate::SecretStore`] implementation.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// The backing store cannot be reached (platform keystore locked,
    /// vault file missing, IPC failure).
    #[error("secret store unavailable: {reason}")]
    Unavailable {
        /// Platform-specific description of the failure.
        reason: String,
    },

    /// The backing store accepted the request but the operation failed.
    #[error("secret store operation failed: {reason}")]
    OperationFailed {
        /// Platform-specific description of the failure.
        reason: String,
    },
}

impl SecretStoreError {
    /// Creates an [`SecretStoreError::Unavailable`] error.
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates an [`SecretStoreError::OperationFailed`] error.
    pub fn operation<S: Into<String>>(reason: S) -> Self {
        Self::OperationFailed {
            reason: reason.into(),
        }
    }
}
