//! Database key management.
//!
//! Each encrypted local store (history, audit, cache) is opened with a
//! 256-bit symmetric key. Keys are generated from the OS random source,
//! persisted in the platform secret store, reused across restarts, and
//! rotatable on demand. Rotation only supplies the new key; re-encrypting
//! the database contents is the caller's job.
//!
//! If the secret store is unavailable every operation fails with
//! [`CoreError::KeyUnavailable`] — there is deliberately no path that
//! falls back to an unencrypted store.

use std::sync::{Arc, Mutex};

use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use strum::{Display, EnumString};
use zeroize::{Zeroize, ZeroizeOnDrop};

use verifykit_secure_store::SecretStore;

use crate::error::{CoreError, CoreResult};

/// PBKDF2-HMAC-SHA256 rounds for password-derived database keys.
///
/// Deliberately expensive so brute-forcing a user-supplied passphrase
/// is slow; run derivation off any interactive thread.
pub const KEY_DERIVATION_ROUNDS: u32 = 310_000;

/// The fixed set of encrypted local stores managed by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DatabaseId {
    /// Scan history store.
    History,
    /// Audit trail store.
    Audit,
    /// Short-lived lookup cache.
    Cache,
}

impl DatabaseId {
    /// Secret-store key under which this database's key material lives.
    fn store_key(self) -> String {
        format!("db-key:{self}")
    }
}

/// Symmetric database key (256-bit).
///
/// Zeroized on drop. The raw bytes never appear in `Debug` output or
/// logs; the hex passphrase accessor exists solely to feed the external
/// encrypted-database open call.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DatabaseKey([u8; 32]);

impl DatabaseKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generates a new random key from the OS random source.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns a reference to the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding of the key, for the encrypted-database open call.
    #[must_use]
    pub fn to_hex_passphrase(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for DatabaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Generates, persists, rotates, and derives database keys.
pub struct KeyManager {
    store: Arc<dyn SecretStore>,
    // Serializes get-or-create so two racing callers cannot mint two
    // different keys for the same database.
    create_lock: Mutex<()>,
}

impl KeyManager {
    /// Creates a key manager over the given secret store.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            create_lock: Mutex::new(()),
        }
    }

    /// Returns the persisted key for `database_id`, generating and
    /// persisting a fresh one on first use. Idempotent until rotation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyUnavailable`] if the secret store cannot
    /// be reached or the persisted key material is malformed.
    pub fn get_or_create_key(&self, database_id: DatabaseId) -> CoreResult<DatabaseKey> {
        let _guard = self
            .create_lock
            .lock()
            .map_err(|e| CoreError::key_unavailable(&e))?;

        let store_key = database_id.store_key();
        match self
            .store
            .read(&store_key)
            .map_err(|e| CoreError::key_unavailable(&e))?
        {
            Some(bytes) => Self::key_from_stored(database_id, &bytes),
            None => {
                let key = DatabaseKey::generate();
                self.store
                    .write(&store_key, key.as_bytes())
                    .map_err(|e| CoreError::key_unavailable(&e))?;
                log::info!("generated key material for {database_id} store");
                Ok(key)
            }
        }
    }

    /// Replaces the persisted key for `database_id` with a fresh one and
    /// returns it. The caller must re-encrypt the database contents.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyUnavailable`] if the secret store cannot
    /// be reached.
    pub fn rotate_key(&self, database_id: DatabaseId) -> CoreResult<DatabaseKey> {
        let _guard = self
            .create_lock
            .lock()
            .map_err(|e| CoreError::key_unavailable(&e))?;

        let key = DatabaseKey::generate();
        self.store
            .write(&database_id.store_key(), key.as_bytes())
            .map_err(|e| CoreError::key_unavailable(&e))?;
        log::warn!("rotated key material for {database_id} store");
        Ok(key)
    }

    /// Returns `true` if a key for `database_id` is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyUnavailable`] if the secret store cannot
    /// be reached.
    pub fn has_key(&self, database_id: DatabaseId) -> CoreResult<bool> {
        let present = self
            .store
            .read(&database_id.store_key())
            .map_err(|e| CoreError::key_unavailable(&e))?
            .is_some();
        Ok(present)
    }

    /// Deletes the persisted key for `database_id`. The associated
    /// database becomes permanently unopenable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyUnavailable`] if the secret store cannot
    /// be reached.
    pub fn delete_key(&self, database_id: DatabaseId) -> CoreResult<()> {
        self.store
            .delete(&database_id.store_key())
            .map_err(|e| CoreError::key_unavailable(&e))?;
        log::warn!("deleted key material for {database_id} store");
        Ok(())
    }

    /// Derives a key from a user-supplied password and salt.
    ///
    /// PBKDF2-HMAC-SHA256 with [`KEY_DERIVATION_ROUNDS`] iterations;
    /// deterministic for equal inputs. This path serves optional
    /// password-derived encryption and is distinct from the random
    /// per-database keys used by default.
    #[must_use]
    pub fn derive_key_from_password(password: &str, salt: &[u8]) -> DatabaseKey {
        let mut out = [0u8; 32];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KEY_DERIVATION_ROUNDS, &mut out);
        DatabaseKey::from_bytes(out)
    }

    fn key_from_stored(database_id: DatabaseId, bytes: &[u8]) -> CoreResult<DatabaseKey> {
        let raw: [u8; 32] = bytes.try_into().map_err(|_| CoreError::KeyUnavailable {
            reason: format!(
                "persisted key for {database_id} store has invalid length {}",
                bytes.len()
            ),
        })?;
        Ok(DatabaseKey::from_bytes(raw))
    }
}
