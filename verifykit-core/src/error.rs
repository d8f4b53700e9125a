//! Error taxonomy for the security core.

use thiserror::Error;
use verifykit_secure_store::SecretStoreError;

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the security core.
///
/// Credential and session failures are deliberately coarse: an unknown
/// username and a wrong password both yield
/// [`CoreError::InvalidCredentials`] so callers (and attackers) cannot
/// distinguish them.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The username/password pair did not verify. Covers unknown
    /// usernames, wrong passwords, and deactivated accounts alike.
    #[error("invalid_credentials")]
    InvalidCredentials,

    /// Too many consecutive failed attempts for this username.
    #[error("account_locked: retry after {retry_after_secs}s")]
    AccountLocked {
        /// Seconds until the lockout window elapses.
        retry_after_secs: u64,
    },

    /// The password does not meet the local password policy.
    #[error("weak_password: {rule}")]
    WeakPassword {
        /// The first unmet policy rule.
        rule: &'static str,
    },

    /// The requested username is already taken.
    #[error("duplicate_username")]
    DuplicateUsername,

    /// First-account setup was requested but an account already exists.
    #[error("setup_already_complete")]
    SetupAlreadyComplete,

    /// No account matches the given account id.
    #[error("account_not_found")]
    AccountNotFound,

    /// No valid session is present.
    #[error("not_authenticated")]
    NotAuthenticated,

    /// The authenticated account's role does not grant the requested
    /// permission.
    #[error("unauthorized")]
    Unauthorized,

    /// Key material cannot be produced because the secret store is
    /// unavailable. There is no unencrypted fallback; callers must
    /// abort the database-open operation.
    #[error("key_unavailable: {reason}")]
    KeyUnavailable {
        /// Description of the underlying store failure.
        reason: String,
    },

    /// The secret store failed during a non-key operation.
    #[error(transparent)]
    Store(#[from] SecretStoreError),

    /// A persisted record could not be encoded or decoded.
    #[error("serialization_error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Creates a [`CoreError::KeyUnavailable`] from a store failure.
    pub fn key_unavailable<E: std::fmt::Display>(source: &E) -> Self {
        Self::KeyUnavailable {
            reason: source.to_string(),
        }
    }

    /// Creates a [`CoreError::Serialization`] error.
    pub fn serialization<E: std::fmt::Display>(source: &E) -> Self {
        Self::Serialization(source.to_string())
    }
}
