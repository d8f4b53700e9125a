//! Local staff accounts: password hashing, policy, and lockout.
//!
//! Accounts are persisted as a CBOR table in the platform secret store.
//! Passwords are never stored; each account carries a unique 256-bit
//! salt and the PBKDF2-HMAC-SHA256 digest of `password` under that
//! salt. Verification failures are counted per username — including
//! usernames that match no account — and five consecutive failures
//! lock the username out for fifteen minutes.
//!
//! Accounts are never destroyed, only deactivated, so collaborating
//! audit systems keep a stable account id to reference.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use verifykit_secure_store::SecretStore;

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};

/// PBKDF2-HMAC-SHA256 rounds for stored password hashes.
pub const PASSWORD_HASH_ROUNDS: u32 = 310_000;

/// Minimum password length accepted by the policy.
pub const MIN_PASSWORD_LENGTH: usize = 12;

/// Consecutive failures after which a username is locked out.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Lockout duration, measured from the last failed attempt.
pub const LOCKOUT_WINDOW_SECS: u64 = 15 * 60;

const SALT_LENGTH: usize = 32;
const ACCOUNTS_KEY: &str = "credentials:accounts";
const LOCKOUTS_KEY: &str = "credentials:lockouts";

/// Opaque stable account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Staff roles, in decreasing order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including user management and system settings.
    Admin,
    /// Everything except user management and system settings.
    Manager,
    /// Scan/verify and history viewing only.
    Operator,
}

/// A local staff account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Opaque stable identifier.
    pub id: AccountId,
    /// Unique, case-sensitive login name.
    pub username: String,
    /// Human-readable name shown by the presentation layer.
    pub display_name: String,
    /// The account's role.
    pub role: Role,
    /// Deactivated accounts cannot log in but are never deleted.
    pub active: bool,
    /// Unix time of account creation.
    pub created_at: u64,
    /// Unix time of the most recent verified login, if any.
    pub last_login_at: Option<u64>,
}

/// Salted password digest, one-to-one with an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PasswordRecord {
    /// 256-bit random salt, regenerated on every password change.
    salt: Vec<u8>,
    /// PBKDF2-HMAC-SHA256 digest of the password under `salt`.
    hash: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccount {
    account: Account,
    password: PasswordRecord,
}

/// Failed-attempt bookkeeping, keyed by username rather than account id
/// so that unknown usernames are tracked identically to real ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LockoutRecord {
    failed_count: u32,
    last_failed_at: u64,
}

/// Account storage, password verification, and lockout enforcement.
pub struct CredentialStore {
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write cycles on the account and lockout
    // tables so concurrent logins cannot lose updates.
    write_lock: Mutex<()>,
    hash_rounds: u32,
    // Hashed against when the username matches no account, so the
    // response cost does not reveal account existence. The stored hash
    // is random and matches no password.
    dummy: PasswordRecord,
}

impl CredentialStore {
    /// Creates a credential store with the production hash cost.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_hash_rounds(store, clock, PASSWORD_HASH_ROUNDS)
    }

    /// Creates a credential store with an explicit PBKDF2 round count.
    ///
    /// Production code should use [`CredentialStore::new`]; lowered
    /// round counts exist to keep test suites fast.
    #[must_use]
    pub fn with_hash_rounds(
        store: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
        hash_rounds: u32,
    ) -> Self {
        let mut dummy_hash = vec![0u8; 32];
        OsRng.fill_bytes(&mut dummy_hash);
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
            hash_rounds,
            dummy: PasswordRecord {
                salt: generate_salt(),
                hash: dummy_hash,
            },
        }
    }

    /// Creates the very first account, with the `Admin` role.
    ///
    /// # Errors
    ///
    /// * [`CoreError::SetupAlreadyComplete`] if any account exists.
    /// * [`CoreError::WeakPassword`] if the password fails policy.
    /// * [`CoreError::Store`] / [`CoreError::Serialization`] on
    ///   persistence failures.
    pub fn setup_first_account(&self, username: &str, password: &str) -> CoreResult<Account> {
        let _guard = self.lock()?;
        let mut accounts = self.load_accounts()?;
        if !accounts.is_empty() {
            return Err(CoreError::SetupAlreadyComplete);
        }
        self.insert_account(&mut accounts, username, password, Role::Admin)
    }

    /// Creates an additional account.
    ///
    /// Authorization (the caller must hold `ManageUsers`) is enforced by
    /// the authentication facade, not here.
    ///
    /// # Errors
    ///
    /// * [`CoreError::DuplicateUsername`] if the username is taken.
    /// * [`CoreError::WeakPassword`] if the password fails policy.
    /// * [`CoreError::Store`] / [`CoreError::Serialization`] on
    ///   persistence failures.
    pub fn create_account(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> CoreResult<Account> {
        let _guard = self.lock()?;
        let mut accounts = self.load_accounts()?;
        if accounts.iter().any(|r| r.account.username == username) {
            return Err(CoreError::DuplicateUsername);
        }
        self.insert_account(&mut accounts, username, password, role)
    }

    /// Verifies a username/password pair.
    ///
    /// Unknown usernames, wrong passwords, and deactivated accounts all
    /// fail identically; the full hash computation runs on every path.
    /// Failed attempts are recorded per username — also for usernames
    /// with no matching account — and reset on verified success or when
    /// the lockout window elapses.
    ///
    /// # Errors
    ///
    /// * [`CoreError::AccountLocked`] while the lockout window is open.
    /// * [`CoreError::InvalidCredentials`] on any verification failure.
    /// * [`CoreError::Store`] / [`CoreError::Serialization`] on
    ///   persistence failures.
    pub fn verify_password(&self, username: &str, password: &str) -> CoreResult<Account> {
        let _guard = self.lock()?;
        let now = self.clock.now_unix();

        let mut lockouts = self.load_lockouts()?;
        if let Some(entry) = lockouts.get(username) {
            if entry.failed_count >= MAX_FAILED_ATTEMPTS {
                let elapsed = now.saturating_sub(entry.last_failed_at);
                if elapsed < LOCKOUT_WINDOW_SECS {
                    return Err(CoreError::AccountLocked {
                        retry_after_secs: LOCKOUT_WINDOW_SECS - elapsed,
                    });
                }
                // Window elapsed; the count starts over.
                lockouts.remove(username);
            }
        }

        let mut accounts = self.load_accounts()?;
        let matched = accounts
            .iter_mut()
            .find(|r| r.account.username == username);

        let verified = match matched {
            Some(record) => {
                let computed = self.hash_password(password, &record.password.salt);
                let hash_ok: bool = computed
                    .as_slice()
                    .ct_eq(record.password.hash.as_slice())
                    .into();
                if hash_ok && record.account.active {
                    record.account.last_login_at = Some(now);
                    Some(record.account.clone())
                } else {
                    None
                }
            }
            None => {
                // Same cost as the real branch; the comparison result is
                // discarded because the stored digest matches nothing.
                let computed = self.hash_password(password, &self.dummy.salt);
                let _: bool = computed.as_slice().ct_eq(self.dummy.hash.as_slice()).into();
                None
            }
        };

        match verified {
            Some(account) => {
                lockouts.remove(username);
                self.save_lockouts(&lockouts)?;
                self.save_accounts(&accounts)?;
                Ok(account)
            }
            None => {
                let entry = lockouts.entry(username.to_string()).or_default();
                entry.failed_count += 1;
                entry.last_failed_at = now;
                if entry.failed_count >= MAX_FAILED_ATTEMPTS {
                    log::warn!("lockout engaged for username after repeated failures");
                }
                self.save_lockouts(&lockouts)?;
                Err(CoreError::InvalidCredentials)
            }
        }
    }

    /// Replaces an account's password with a fresh salt and hash.
    ///
    /// Callers must follow up with a global session revocation (the
    /// facade's `change_password` does both).
    ///
    /// # Errors
    ///
    /// * [`CoreError::AccountNotFound`] if no account has this id.
    /// * [`CoreError::WeakPassword`] if the password fails policy.
    /// * [`CoreError::Store`] / [`CoreError::Serialization`] on
    ///   persistence failures.
    pub fn change_password(&self, account_id: &AccountId, new_password: &str) -> CoreResult<()> {
        check_password_policy(new_password)?;
        let _guard = self.lock()?;
        let mut accounts = self.load_accounts()?;
        let record = accounts
            .iter_mut()
            .find(|r| &r.account.id == account_id)
            .ok_or(CoreError::AccountNotFound)?;

        let salt = generate_salt();
        record.password.hash = self.hash_password(new_password, &salt);
        record.password.salt = salt;
        self.save_accounts(&accounts)
    }

    /// Changes an account's role.
    ///
    /// # Errors
    ///
    /// * [`CoreError::AccountNotFound`] if no account has this id.
    /// * [`CoreError::Store`] / [`CoreError::Serialization`] on
    ///   persistence failures.
    pub fn set_role(&self, account_id: &AccountId, role: Role) -> CoreResult<()> {
        self.update_account(account_id, |account| account.role = role)
    }

    /// Updates an account's display name.
    ///
    /// # Errors
    ///
    /// * [`CoreError::AccountNotFound`] if no account has this id.
    /// * [`CoreError::Store`] / [`CoreError::Serialization`] on
    ///   persistence failures.
    pub fn set_display_name(&self, account_id: &AccountId, display_name: &str) -> CoreResult<()> {
        let display_name = display_name.to_string();
        self.update_account(account_id, move |account| account.display_name = display_name)
    }

    /// Deactivates an account. The record is kept for audit continuity;
    /// the account can no longer log in.
    ///
    /// # Errors
    ///
    /// * [`CoreError::AccountNotFound`] if no account has this id.
    /// * [`CoreError::Store`] / [`CoreError::Serialization`] on
    ///   persistence failures.
    pub fn deactivate_account(&self, account_id: &AccountId) -> CoreResult<()> {
        self.update_account(account_id, |account| account.active = false)
    }

    /// Looks up an account by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] / [`CoreError::Serialization`] on
    /// persistence failures.
    pub fn account_by_id(&self, account_id: &AccountId) -> CoreResult<Option<Account>> {
        let accounts = self.load_accounts()?;
        Ok(accounts
            .into_iter()
            .map(|r| r.account)
            .find(|a| &a.id == account_id))
    }

    /// Looks up an account by username (case-sensitive).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] / [`CoreError::Serialization`] on
    /// persistence failures.
    pub fn account_by_username(&self, username: &str) -> CoreResult<Option<Account>> {
        let accounts = self.load_accounts()?;
        Ok(accounts
            .into_iter()
            .map(|r| r.account)
            .find(|a| a.username == username))
    }

    /// Lists all accounts, including deactivated ones.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] / [`CoreError::Serialization`] on
    /// persistence failures.
    pub fn list_accounts(&self) -> CoreResult<Vec<Account>> {
        let accounts = self.load_accounts()?;
        Ok(accounts.into_iter().map(|r| r.account).collect())
    }

    /// Returns `true` once any account exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] / [`CoreError::Serialization`] on
    /// persistence failures.
    pub fn is_setup_complete(&self) -> CoreResult<bool> {
        Ok(!self.load_accounts()?.is_empty())
    }

    fn insert_account(
        &self,
        accounts: &mut Vec<StoredAccount>,
        username: &str,
        password: &str,
        role: Role,
    ) -> CoreResult<Account> {
        check_password_policy(password)?;

        let salt = generate_salt();
        let hash = self.hash_password(password, &salt);
        let account = Account {
            id: AccountId::generate(),
            username: username.to_string(),
            display_name: username.to_string(),
            role,
            active: true,
            created_at: self.clock.now_unix(),
            last_login_at: None,
        };
        accounts.push(StoredAccount {
            account: account.clone(),
            password: PasswordRecord { salt, hash },
        });
        self.save_accounts(accounts)?;
        Ok(account)
    }

    fn update_account<F: FnOnce(&mut Account)>(
        &self,
        account_id: &AccountId,
        mutate: F,
    ) -> CoreResult<()> {
        let _guard = self.lock()?;
        let mut accounts = self.load_accounts()?;
        let record = accounts
            .iter_mut()
            .find(|r| &r.account.id == account_id)
            .ok_or(CoreError::AccountNotFound)?;
        mutate(&mut record.account);
        self.save_accounts(&accounts)
    }

    fn hash_password(&self, password: &str, salt: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 32];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, self.hash_rounds, &mut out);
        out
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| CoreError::Serialization(format!("credential lock poisoned: {e}")))
    }

    fn load_accounts(&self) -> CoreResult<Vec<StoredAccount>> {
        match self.store.read(ACCOUNTS_KEY)? {
            Some(bytes) => ciborium::from_reader(bytes.as_slice())
                .map_err(|e| CoreError::serialization(&e)),
            None => Ok(Vec::new()),
        }
    }

    fn save_accounts(&self, accounts: &[StoredAccount]) -> CoreResult<()> {
        let mut buf = Vec::new();
        ciborium::into_writer(&accounts, &mut buf).map_err(|e| CoreError::serialization(&e))?;
        self.store.write(ACCOUNTS_KEY, &buf)?;
        Ok(())
    }

    fn load_lockouts(&self) -> CoreResult<HashMap<String, LockoutRecord>> {
        match self.store.read(LOCKOUTS_KEY)? {
            Some(bytes) => match ciborium::from_reader(bytes.as_slice()) {
                Ok(lockouts) => Ok(lockouts),
                Err(e) => {
                    // A corrupt lockout table must not brick every login;
                    // it only loses failure counts.
                    log::warn!("discarding corrupt lockout table: {e}");
                    Ok(HashMap::new())
                }
            },
            None => Ok(HashMap::new()),
        }
    }

    fn save_lockouts(&self, lockouts: &HashMap<String, LockoutRecord>) -> CoreResult<()> {
        let mut buf = Vec::new();
        ciborium::into_writer(lockouts, &mut buf).map_err(|e| CoreError::serialization(&e))?;
        self.store.write(LOCKOUTS_KEY, &buf)?;
        Ok(())
    }
}

fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Checks the password policy and reports the first unmet rule.
fn check_password_policy(password: &str) -> CoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CoreError::WeakPassword {
            rule: "must be at least 12 characters",
        });
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(CoreError::WeakPassword {
            rule: "must contain an uppercase letter",
        });
    }
    if !password.chars().any(char::is_lowercase) {
        return Err(CoreError::WeakPassword {
            rule: "must contain a lowercase letter",
        });
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(CoreError::WeakPassword {
            rule: "must contain a digit",
        });
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(CoreError::WeakPassword {
            rule: "must contain a symbol",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use verifykit_secure_store::MemorySecretStore;

    use crate::clock::test_support::ManualClock;

    use super::*;

    const TEST_ROUNDS: u32 = 1_000;
    const GOOD_PASSWORD: &str = "Str0ng!Passw0rd";

    fn fixture() -> (Arc<MemorySecretStore>, Arc<ManualClock>, CredentialStore) {
        let store = Arc::new(MemorySecretStore::new());
        let clock = Arc::new(ManualClock::at(1_700_000_000));
        let credentials = CredentialStore::with_hash_rounds(
            Arc::clone(&store) as Arc<dyn SecretStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            TEST_ROUNDS,
        );
        (store, clock, credentials)
    }

    #[test]
    fn test_setup_then_verify() {
        let (_, _, credentials) = fixture();
        let account = credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        assert_eq!(account.role, Role::Admin);
        assert!(account.active);
        assert!(credentials.is_setup_complete().unwrap());

        let verified = credentials.verify_password("admin", GOOD_PASSWORD).unwrap();
        assert_eq!(verified.id, account.id);
        assert_eq!(verified.last_login_at, Some(1_700_000_000));
    }

    #[test]
    fn test_setup_twice_fails() {
        let (_, _, credentials) = fixture();
        credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        let result = credentials.setup_first_account("admin2", GOOD_PASSWORD);
        assert!(matches!(result, Err(CoreError::SetupAlreadyComplete)));
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let (_, _, credentials) = fixture();
        credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        let result = credentials.create_account("admin", GOOD_PASSWORD, Role::Operator);
        assert!(matches!(result, Err(CoreError::DuplicateUsername)));
    }

    #[test_case("Sh0rt!pw", "12 characters"; "too short")]
    #[test_case("str0ng!passw0rd", "uppercase"; "no uppercase")]
    #[test_case("STR0NG!PASSW0RD", "lowercase"; "no lowercase")]
    #[test_case("Strong!Password", "digit"; "no digit")]
    #[test_case("Str0ngPassw0rd", "symbol"; "no symbol")]
    fn test_password_policy_first_unmet_rule(password: &str, expected: &str) {
        let (_, _, credentials) = fixture();
        let result = credentials.setup_first_account("admin", password);
        match result {
            Err(CoreError::WeakPassword { rule }) => assert!(rule.contains(expected)),
            other => panic!("expected WeakPassword, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_password_and_unknown_user_fail_identically() {
        let (_, _, credentials) = fixture();
        credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();

        let wrong = credentials.verify_password("admin", "Wrong!Passw0rd1");
        assert!(matches!(wrong, Err(CoreError::InvalidCredentials)));

        let ghost = credentials.verify_password("nobody", GOOD_PASSWORD);
        assert!(matches!(ghost, Err(CoreError::InvalidCredentials)));
    }

    #[test]
    fn test_single_character_mutation_fails() {
        let (_, _, credentials) = fixture();
        credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        let mutated = credentials.verify_password("admin", "Str0ng!Passw0rD");
        assert!(matches!(mutated, Err(CoreError::InvalidCredentials)));
    }

    #[test]
    fn test_same_password_different_hashes() {
        let (store, _, credentials) = fixture();
        credentials
            .setup_first_account("alice", GOOD_PASSWORD)
            .unwrap();
        credentials
            .create_account("bob", GOOD_PASSWORD, Role::Operator)
            .unwrap();

        let bytes = store.read(ACCOUNTS_KEY).unwrap().unwrap();
        let records: Vec<StoredAccount> = ciborium::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].password.salt, records[1].password.salt);
        assert_ne!(records[0].password.hash, records[1].password.hash);
    }

    #[test]
    fn test_lockout_after_five_failures() {
        let (_, clock, credentials) = fixture();
        credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();

        for _ in 0..5 {
            let result = credentials.verify_password("admin", "Wrong!Passw0rd1");
            assert!(matches!(result, Err(CoreError::InvalidCredentials)));
        }

        // Sixth attempt is rejected even with the correct password.
        let locked = credentials.verify_password("admin", GOOD_PASSWORD);
        match locked {
            Err(CoreError::AccountLocked { retry_after_secs }) => {
                assert_eq!(retry_after_secs, LOCKOUT_WINDOW_SECS);
            }
            other => panic!("expected AccountLocked, got {other:?}"),
        }

        // Still locked one second before the window closes.
        clock.advance(LOCKOUT_WINDOW_SECS - 1);
        assert!(matches!(
            credentials.verify_password("admin", GOOD_PASSWORD),
            Err(CoreError::AccountLocked { .. })
        ));

        // Window elapsed: the correct password succeeds and the failure
        // count starts over.
        clock.advance(1);
        credentials.verify_password("admin", GOOD_PASSWORD).unwrap();
        let after = credentials.verify_password("admin", "Wrong!Passw0rd1");
        assert!(matches!(after, Err(CoreError::InvalidCredentials)));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (_, _, credentials) = fixture();
        credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();

        for _ in 0..4 {
            let _ = credentials.verify_password("admin", "Wrong!Passw0rd1");
        }
        credentials.verify_password("admin", GOOD_PASSWORD).unwrap();

        // Four more failures fit before lockout because the count reset.
        for _ in 0..4 {
            let result = credentials.verify_password("admin", "Wrong!Passw0rd1");
            assert!(matches!(result, Err(CoreError::InvalidCredentials)));
        }
        credentials.verify_password("admin", GOOD_PASSWORD).unwrap();
    }

    #[test]
    fn test_unknown_username_locks_out_too() {
        let (_, _, credentials) = fixture();
        credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();

        for _ in 0..5 {
            let result = credentials.verify_password("nobody", GOOD_PASSWORD);
            assert!(matches!(result, Err(CoreError::InvalidCredentials)));
        }
        let locked = credentials.verify_password("nobody", GOOD_PASSWORD);
        assert!(matches!(locked, Err(CoreError::AccountLocked { .. })));
    }

    #[test]
    fn test_change_password_resalts() {
        let (store, _, credentials) = fixture();
        let account = credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();

        let before = store.read(ACCOUNTS_KEY).unwrap().unwrap();
        let before: Vec<StoredAccount> = ciborium::from_reader(before.as_slice()).unwrap();

        credentials
            .change_password(&account.id, "N3w!Passw0rd!!")
            .unwrap();

        let after = store.read(ACCOUNTS_KEY).unwrap().unwrap();
        let after: Vec<StoredAccount> = ciborium::from_reader(after.as_slice()).unwrap();
        assert_ne!(before[0].password.salt, after[0].password.salt);
        assert_ne!(before[0].password.hash, after[0].password.hash);

        let old = credentials.verify_password("admin", GOOD_PASSWORD);
        assert!(matches!(old, Err(CoreError::InvalidCredentials)));
        credentials
            .verify_password("admin", "N3w!Passw0rd!!")
            .unwrap();
    }

    #[test]
    fn test_deactivated_account_cannot_log_in() {
        let (_, _, credentials) = fixture();
        credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        let operator = credentials
            .create_account("op", GOOD_PASSWORD, Role::Operator)
            .unwrap();

        credentials.deactivate_account(&operator.id).unwrap();
        let result = credentials.verify_password("op", GOOD_PASSWORD);
        assert!(matches!(result, Err(CoreError::InvalidCredentials)));

        // The record survives for audit continuity.
        let kept = credentials.account_by_id(&operator.id).unwrap().unwrap();
        assert!(!kept.active);
    }

    #[test]
    fn test_set_role_and_display_name() {
        let (_, _, credentials) = fixture();
        let account = credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();
        let operator = credentials
            .create_account("op", GOOD_PASSWORD, Role::Operator)
            .unwrap();

        credentials.set_role(&operator.id, Role::Manager).unwrap();
        credentials
            .set_display_name(&operator.id, "Front Desk")
            .unwrap();

        let updated = credentials.account_by_id(&operator.id).unwrap().unwrap();
        assert_eq!(updated.role, Role::Manager);
        assert_eq!(updated.display_name, "Front Desk");

        let admin = credentials
            .account_by_username("admin")
            .unwrap()
            .unwrap();
        assert_eq!(admin.id, account.id);
        assert_eq!(credentials.list_accounts().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_lockout_table_is_discarded() {
        let (store, _, credentials) = fixture();
        credentials
            .setup_first_account("admin", GOOD_PASSWORD)
            .unwrap();

        store.write(LOCKOUTS_KEY, b"not cbor").unwrap();
        // Login still works; the corrupt table only loses counts.
        credentials.verify_password("admin", GOOD_PASSWORD).unwrap();
    }
}
