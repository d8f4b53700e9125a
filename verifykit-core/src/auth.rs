//! Authentication facade and role-based access control.
//!
//! Composes the credential store and the session token service to
//! answer "who is this request from, and may they do X". Permissions
//! derive solely from the fixed role set — there are no per-account
//! overrides — and the entire role/permission mapping lives in
//! [`role_allows`] so it cannot drift.

use std::sync::Arc;

use verifykit_secure_store::SecretStore;

use crate::credentials::{Account, AccountId, CredentialStore, Role};
use crate::error::{CoreError, CoreResult};
use crate::session::SessionTokenService;

const SESSION_TOKEN_KEY: &str = "session:current-token";

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Scan a QR credential and request verification.
    ScanVerify,
    /// View the local scan history.
    ViewHistory,
    /// Export history/reports.
    ExportData,
    /// Create, deactivate, or re-role accounts.
    ManageUsers,
    /// Change system settings, including key rotation.
    SystemSettings,
}

/// The single role/permission predicate.
///
/// Admin holds every permission; Manager everything except user
/// management and system settings; Operator only scanning and history.
#[must_use]
pub const fn role_allows(role: Role, permission: Permission) -> bool {
    match role {
        Role::Admin => true,
        Role::Manager => !matches!(
            permission,
            Permission::ManageUsers | Permission::SystemSettings
        ),
        Role::Operator => matches!(
            permission,
            Permission::ScanVerify | Permission::ViewHistory
        ),
    }
}

/// Session-aware authentication and authorization entry point.
pub struct AuthenticationFacade {
    credentials: Arc<CredentialStore>,
    sessions: Arc<SessionTokenService>,
    store: Arc<dyn SecretStore>,
}

impl AuthenticationFacade {
    /// Creates a facade over the given collaborators.
    #[must_use]
    pub fn new(
        credentials: Arc<CredentialStore>,
        sessions: Arc<SessionTokenService>,
        store: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            credentials,
            sessions,
            store,
        }
    }

    /// Verifies the password, issues a session token, and persists it
    /// as the terminal's current session.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError::InvalidCredentials`] /
    /// [`CoreError::AccountLocked`] from verification and store errors
    /// from token persistence.
    pub fn login(&self, username: &str, password: &str) -> CoreResult<Account> {
        let account = self.credentials.verify_password(username, password)?;
        let token = self
            .sessions
            .create_token(&account.id, &account.username, account.role)?;
        self.store.write(SESSION_TOKEN_KEY, token.as_bytes())?;
        log::info!("session opened for account {}", account.id);
        Ok(account)
    }

    /// Discards the persisted session token.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if the secret store is unavailable.
    pub fn logout(&self) -> CoreResult<()> {
        self.store.delete(SESSION_TOKEN_KEY)?;
        Ok(())
    }

    /// Resolves the currently authenticated account, if any.
    ///
    /// Reads the persisted token, validates it, and re-resolves the
    /// account fresh from the credential store — embedded claims are
    /// used for fast-path authorization only, never trusted for the
    /// account's current role or active status. Any internal failure
    /// (store unavailable, corrupt token bytes, stale account) degrades
    /// to `None`, forcing re-authentication rather than crashing.
    #[must_use]
    pub fn current_account(&self) -> Option<Account> {
        let bytes = match self.store.read(SESSION_TOKEN_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log::debug!("session lookup degraded to unauthenticated: {e}");
                return None;
            }
        };
        let token = String::from_utf8(bytes).ok()?;
        let claims = self.sessions.validate_token(&token)?;
        let account = self.credentials.account_by_id(&claims.sub).ok()??;
        if account.active {
            Some(account)
        } else {
            None
        }
    }

    /// Requires an authenticated account whose role is in `allowed`.
    ///
    /// # Errors
    ///
    /// * [`CoreError::NotAuthenticated`] without a valid session.
    /// * [`CoreError::Unauthorized`] if the role is not allowed.
    pub fn require_role(&self, allowed: &[Role]) -> CoreResult<Account> {
        let account = self.current_account().ok_or(CoreError::NotAuthenticated)?;
        if allowed.contains(&account.role) {
            Ok(account)
        } else {
            Err(CoreError::Unauthorized)
        }
    }

    /// Requires an authenticated account whose role grants `permission`.
    ///
    /// # Errors
    ///
    /// * [`CoreError::NotAuthenticated`] without a valid session.
    /// * [`CoreError::Unauthorized`] if the role lacks the permission.
    pub fn require_permission(&self, permission: Permission) -> CoreResult<Account> {
        let account = self.current_account().ok_or(CoreError::NotAuthenticated)?;
        if role_allows(account.role, permission) {
            Ok(account)
        } else {
            Err(CoreError::Unauthorized)
        }
    }

    /// Reissues the persisted session token with a fresh validity
    /// window. Called by the presentation layer's periodic refresh.
    ///
    /// # Errors
    ///
    /// * [`CoreError::NotAuthenticated`] if no valid session exists.
    /// * [`CoreError::Store`] if persistence fails.
    pub fn refresh_session(&self) -> CoreResult<()> {
        let bytes = self
            .store
            .read(SESSION_TOKEN_KEY)?
            .ok_or(CoreError::NotAuthenticated)?;
        let token =
            String::from_utf8(bytes).map_err(|_| CoreError::NotAuthenticated)?;
        let refreshed = self
            .sessions
            .refresh_token(&token)
            .ok_or(CoreError::NotAuthenticated)?;
        self.store.write(SESSION_TOKEN_KEY, refreshed.as_bytes())?;
        Ok(())
    }

    /// Changes an account's password and revokes every outstanding
    /// session by rotating the signing secret.
    ///
    /// # Errors
    ///
    /// Propagates policy and persistence errors from the credential
    /// store and rotation errors from the session service.
    pub fn change_password(
        &self,
        account_id: &AccountId,
        new_password: &str,
    ) -> CoreResult<()> {
        self.credentials.change_password(account_id, new_password)?;
        self.sessions.invalidate_all_tokens()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use test_case::test_case;
    use verifykit_secure_store::{MemorySecretStore, SecretStoreError, SecretStoreResult};

    use crate::clock::test_support::ManualClock;
    use crate::clock::Clock;

    use super::*;

    const GOOD_PASSWORD: &str = "Str0ng!Passw0rd";

    /// In-memory store that can be switched into an "unreachable" state
    /// mid-test, as when the platform keystore locks itself.
    struct FlakySecretStore {
        inner: MemorySecretStore,
        offline: AtomicBool,
    }

    impl FlakySecretStore {
        fn new() -> Self {
            Self {
                inner: MemorySecretStore::new(),
                offline: AtomicBool::new(false),
            }
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }

        fn check(&self) -> SecretStoreResult<()> {
            if self.offline.load(Ordering::SeqCst) {
                Err(SecretStoreError::unavailable("keystore offline"))
            } else {
                Ok(())
            }
        }
    }

    impl SecretStore for FlakySecretStore {
        fn read(&self, key: &str) -> SecretStoreResult<Option<Vec<u8>>> {
            self.check()?;
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &[u8]) -> SecretStoreResult<()> {
            self.check()?;
            self.inner.write(key, value)
        }

        fn delete(&self, key: &str) -> SecretStoreResult<()> {
            self.check()?;
            self.inner.delete(key)
        }
    }

    struct Fixture {
        store: Arc<MemorySecretStore>,
        credentials: Arc<CredentialStore>,
        facade: AuthenticationFacade,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemorySecretStore::new());
        let clock = Arc::new(ManualClock::at(1_700_000_000));
        let credentials = Arc::new(CredentialStore::with_hash_rounds(
            Arc::clone(&store) as Arc<dyn SecretStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            1_000,
        ));
        let sessions = Arc::new(
            SessionTokenService::new(
                Arc::clone(&store) as Arc<dyn SecretStore>,
                clock as Arc<dyn Clock>,
            )
            .unwrap(),
        );
        let facade = AuthenticationFacade::new(
            Arc::clone(&credentials),
            sessions,
            Arc::clone(&store) as Arc<dyn SecretStore>,
        );
        Fixture {
            store,
            credentials,
            facade,
        }
    }

    #[test_case(Role::Admin, Permission::ManageUsers, true)]
    #[test_case(Role::Admin, Permission::SystemSettings, true)]
    #[test_case(Role::Admin, Permission::ScanVerify, true)]
    #[test_case(Role::Manager, Permission::ScanVerify, true)]
    #[test_case(Role::Manager, Permission::ViewHistory, true)]
    #[test_case(Role::Manager, Permission::ExportData, true)]
    #[test_case(Role::Manager, Permission::ManageUsers, false)]
    #[test_case(Role::Manager, Permission::SystemSettings, false)]
    #[test_case(Role::Operator, Permission::ScanVerify, true)]
    #[test_case(Role::Operator, Permission::ViewHistory, true)]
    #[test_case(Role::Operator, Permission::ExportData, false)]
    #[test_case(Role::Operator, Permission::ManageUsers, false)]
    #[test_case(Role::Operator, Permission::SystemSettings, false)]
    fn test_role_permission_matrix(role: Role, permission: Permission, expected: bool) {
        assert_eq!(role_allows(role, permission), expected);
    }

    #[test]
    fn test_login_then_current_account() {
        let f = fixture();
        f.credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();

        assert!(f.facade.current_account().is_none());

        let account = f.facade.login("admin", GOOD_PASSWORD).unwrap();
        let current = f.facade.current_account().unwrap();
        assert_eq!(current.id, account.id);

        f.facade.logout().unwrap();
        assert!(f.facade.current_account().is_none());
    }

    #[test]
    fn test_current_account_reflects_fresh_role() {
        let f = fixture();
        f.credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        let operator = f
            .credentials
            .create_account("op", GOOD_PASSWORD, Role::Operator)
            .unwrap();

        f.facade.login("op", GOOD_PASSWORD).unwrap();
        // Role change after login must be visible without a new token.
        f.credentials.set_role(&operator.id, Role::Manager).unwrap();
        let current = f.facade.current_account().unwrap();
        assert_eq!(current.role, Role::Manager);
    }

    #[test]
    fn test_deactivation_ends_session() {
        let f = fixture();
        f.credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        let operator = f
            .credentials
            .create_account("op", GOOD_PASSWORD, Role::Operator)
            .unwrap();

        f.facade.login("op", GOOD_PASSWORD).unwrap();
        f.credentials.deactivate_account(&operator.id).unwrap();
        assert!(f.facade.current_account().is_none());
    }

    #[test]
    fn test_require_permission_and_role() {
        let f = fixture();
        f.credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        f.credentials
            .create_account("op", GOOD_PASSWORD, Role::Operator)
            .unwrap();

        let unauth = f.facade.require_permission(Permission::ScanVerify);
        assert!(matches!(unauth, Err(CoreError::NotAuthenticated)));

        f.facade.login("op", GOOD_PASSWORD).unwrap();
        f.facade.require_permission(Permission::ScanVerify).unwrap();
        let denied = f.facade.require_permission(Permission::ManageUsers);
        assert!(matches!(denied, Err(CoreError::Unauthorized)));

        f.facade.require_role(&[Role::Operator, Role::Admin]).unwrap();
        let wrong_role = f.facade.require_role(&[Role::Admin]);
        assert!(matches!(wrong_role, Err(CoreError::Unauthorized)));
    }

    #[test]
    fn test_change_password_revokes_all_sessions() {
        let f = fixture();
        let account = f
            .credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();

        f.facade.login("admin", GOOD_PASSWORD).unwrap();
        assert!(f.facade.current_account().is_some());

        f.facade
            .change_password(&account.id, "N3w!Passw0rd!!")
            .unwrap();
        assert!(f.facade.current_account().is_none());

        f.facade.login("admin", "N3w!Passw0rd!!").unwrap();
        assert!(f.facade.current_account().is_some());
    }

    #[test]
    fn test_corrupt_persisted_token_degrades_to_none() {
        let f = fixture();
        f.credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        f.store
            .write(SESSION_TOKEN_KEY, &[0xFF, 0xFE, 0x00, 0x01])
            .unwrap();
        assert!(f.facade.current_account().is_none());
    }

    #[test]
    fn test_store_outage_degrades_to_unauthenticated() {
        let store = Arc::new(FlakySecretStore::new());
        let clock = Arc::new(ManualClock::at(1_700_000_000));
        let credentials = Arc::new(CredentialStore::with_hash_rounds(
            Arc::clone(&store) as Arc<dyn SecretStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            1_000,
        ));
        let sessions = Arc::new(
            SessionTokenService::new(
                Arc::clone(&store) as Arc<dyn SecretStore>,
                clock as Arc<dyn Clock>,
            )
            .unwrap(),
        );
        let facade = AuthenticationFacade::new(
            Arc::clone(&credentials),
            sessions,
            Arc::clone(&store) as Arc<dyn SecretStore>,
        );

        credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        facade.login("admin", GOOD_PASSWORD).unwrap();
        assert!(facade.current_account().is_some());

        // An unreachable store means no session, not a panic or a stale
        // cached account.
        store.go_offline();
        assert!(facade.current_account().is_none());
        assert!(matches!(
            facade.require_permission(Permission::ScanVerify),
            Err(CoreError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_refresh_session_requires_valid_session() {
        let f = fixture();
        f.credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();

        let no_session = f.facade.refresh_session();
        assert!(matches!(no_session, Err(CoreError::NotAuthenticated)));

        f.facade.login("admin", GOOD_PASSWORD).unwrap();
        f.facade.refresh_session().unwrap();
        assert!(f.facade.current_account().is_some());
    }
}
