//! In-memory implementation of the secret store for testing.
//!
//! This implementation is NOT secure for production use: values live in
//! ordinary heap memory with no platform protection. It exists so the
//! core's unit and integration tests can run without a device keystore.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::{SecretStore, SecretStoreError, SecretStoreResult};

/// In-memory secret store backed by a `HashMap`.
///
/// Thread-safe, so tests can exercise concurrent login and rotation
/// paths against a single instance.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySecretStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().unwrap().len()
    }

    /// Returns `true` if no entries are stored.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().unwrap().is_empty()
    }

    /// Clears all stored entries (useful for test isolation).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self) {
        self.values.write().unwrap().clear();
    }
}

impl SecretStore for MemorySecretStore {
    fn read(&self, key: &str) -> SecretStoreResult<Option<Vec<u8>>> {
        let values = self
            .values
            .read()
            .map_err(|e| SecretStoreError::operation(format!("lock poisoned: {e}")))?;
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> SecretStoreResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|e| SecretStoreError::operation(format!("lock poisoned: {e}")))?;
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> SecretStoreResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|e| SecretStoreError::operation(format!("lock poisoned: {e}")))?;
        values.remove(key);
        Ok(())
    }
}
