//! Platform secret-store abstraction for VerifyKit.
//!
//! The security core never writes secrets to plain files. Everything
//! confidential (password records, the token signing secret, database
//! key material, the persisted session token) goes through the
//! [`SecretStore`] trait, which platform hosts back with their native
//! secure key-value storage:
//!
//! * **iOS**: Keychain Services with `kSecAttrAccessibleWhenUnlockedThisDeviceOnly`
//! * **Android**: `EncryptedSharedPreferences` over the Android Keystore
//! * **Desktop**: OS credential manager or an encrypted file vault
//!
//! The core treats the store as confidentiality-guaranteeing but makes
//! no integrity assumption beyond the platform's own contract. Store
//! failures always surface as [`SecretStoreError`]; callers decide
//! whether a failure is fatal (key management) or degrades to a safe
//! default (session lookup).

mod error;
mod memory;

pub use error::SecretStoreError;
pub use memory::MemorySecretStore;

/// Result alias for secret-store operations.
pub type SecretStoreResult<T> = Result<T, SecretStoreError>;

/// Opaque encrypted key-value persistence.
///
/// Implementations must serialize writes to the same key; the core
/// relies on read-modify-write sequences under its own locks, but two
/// independent `write` calls for one key must not interleave bytes.
pub trait SecretStore: Send + Sync {
    /// Reads the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unavailable (e.g., the
    /// platform keystore is locked). Absence is not an error.
    fn read(&self, key: &str) -> SecretStoreResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the write.
    fn write(&self, key: &str, value: &[u8]) -> SecretStoreResult<()>;

    /// Deletes the value stored under `key`. Deleting an absent key is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unavailable.
    fn delete(&self, key: &str) -> SecretStoreResult<()>;
}
