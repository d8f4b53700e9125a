//! Stateless session tokens.
//!
//! There is no server to keep a session table, so a token must certify
//! itself: `base64url(json payload) . base64url(hmac_sha256(payload))`
//! under a rotating 256-bit signing secret held in the secret store.
//! A token is valid iff its signature verifies against the *current*
//! secret and it has not expired. Rotating the secret is therefore the
//! sole — and total — revocation mechanism; no per-token denylist
//! exists or is needed.
//!
//! Validation is a pure function over the token besides reading the
//! current secret, which is swapped as a single value under a `RwLock`;
//! it is safe to call from any thread.

use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use verifykit_secure_store::SecretStore;

use crate::clock::Clock;
use crate::credentials::{AccountId, Role};
use crate::error::{CoreError, CoreResult};

/// Token validity window from issuance.
pub const TOKEN_TTL_SECS: u64 = 60 * 60;

const SIGNING_SECRET_KEY: &str = "session:signing-secret";

type HmacSha256 = Hmac<Sha256>;

/// The signed token payload.
///
/// Claims are trusted only for fast-path authorization; anything shown
/// to the user (current role, active status) is re-resolved from the
/// credential store by the facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the account id.
    pub sub: AccountId,
    /// Username at issuance.
    pub usr: String,
    /// Role at issuance.
    pub role: Role,
    /// Issued-at, Unix seconds.
    pub iat: u64,
    /// Expiry, Unix seconds.
    pub exp: u64,
    /// Random token id, for revocation auditing.
    pub jti: String,
}

/// Token signing secret (256-bit). Zeroized on drop, redacted in Debug.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct SigningSecret([u8; 32]);

impl SigningSecret {
    fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningSecret")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Creates, validates, refreshes, and mass-revokes session tokens.
pub struct SessionTokenService {
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    // Single atomically-swapped value; readers always see a complete
    // secret, never a partially rotated one.
    secret: RwLock<SigningSecret>,
}

impl SessionTokenService {
    /// Creates the service, loading the persisted signing secret or
    /// generating and persisting a fresh one on first run.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if the secret store is unavailable.
    pub fn new(store: Arc<dyn SecretStore>, clock: Arc<dyn Clock>) -> CoreResult<Self> {
        let secret = match store.read(SIGNING_SECRET_KEY)? {
            Some(bytes) => match <[u8; 32]>::try_from(bytes.as_slice()) {
                Ok(raw) => SigningSecret(raw),
                Err(_) => {
                    // A malformed persisted secret cannot verify any
                    // outstanding token anyway; replace it.
                    log::warn!("replacing malformed signing secret");
                    let fresh = SigningSecret::generate();
                    store.write(SIGNING_SECRET_KEY, &fresh.0)?;
                    fresh
                }
            },
            None => {
                let fresh = SigningSecret::generate();
                store.write(SIGNING_SECRET_KEY, &fresh.0)?;
                fresh
            }
        };

        Ok(Self {
            store,
            clock,
            secret: RwLock::new(secret),
        })
    }

    /// Issues a signed token valid for [`TOKEN_TTL_SECS`] from now.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] if the payload cannot be
    /// encoded or the secret lock is poisoned.
    pub fn create_token(
        &self,
        account_id: &AccountId,
        username: &str,
        role: Role,
    ) -> CoreResult<String> {
        let now = self.clock.now_unix();
        let claims = TokenClaims {
            sub: account_id.clone(),
            usr: username.to_string(),
            role,
            iat: now,
            exp: now + TOKEN_TTL_SECS,
            jti: Uuid::new_v4().to_string(),
        };

        let payload = serde_json::to_vec(&claims).map_err(|e| CoreError::serialization(&e))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);

        let secret = self
            .secret
            .read()
            .map_err(|e| CoreError::Serialization(format!("secret lock poisoned: {e}")))?;
        let signature = sign(&secret, payload_b64.as_bytes());
        drop(secret);

        Ok(format!("{payload_b64}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Validates a token against the current signing secret and clock.
    ///
    /// Returns the claims if the signature verifies and the token has
    /// not expired; `None` otherwise. Malformed input of any kind —
    /// wrong segment count, bad base64, junk JSON, truncated signature —
    /// is equivalent to an invalid token and never an error.
    #[must_use]
    pub fn validate_token(&self, token: &str) -> Option<TokenClaims> {
        let (payload_b64, signature_b64) = token.split_once('.')?;
        if signature_b64.contains('.') {
            return None;
        }

        let presented = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
        let expected = {
            let secret = self.secret.read().ok()?;
            sign(&secret, payload_b64.as_bytes())
        };
        let signature_ok: bool = expected.ct_eq(presented.as_slice()).into();
        if !signature_ok {
            return None;
        }

        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let claims: TokenClaims = serde_json::from_slice(&payload).ok()?;
        if self.clock.now_unix() >= claims.exp {
            return None;
        }
        Some(claims)
    }

    /// Reissues a fresh token (new window, new token id) for the
    /// subject of a currently valid token, or `None` if the input token
    /// is already invalid.
    #[must_use]
    pub fn refresh_token(&self, token: &str) -> Option<String> {
        let claims = self.validate_token(token)?;
        self.create_token(&claims.sub, &claims.usr, claims.role).ok()
    }

    /// Rotates the signing secret, instantly invalidating every token
    /// issued before the rotation.
    ///
    /// The new secret is persisted before it becomes visible to
    /// readers; if persistence fails the old secret stays in force.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if the secret store rejects the new
    /// secret.
    pub fn invalidate_all_tokens(&self) -> CoreResult<()> {
        let fresh = SigningSecret::generate();
        self.store.write(SIGNING_SECRET_KEY, &fresh.0)?;

        let mut secret = self
            .secret
            .write()
            .map_err(|e| CoreError::Serialization(format!("secret lock poisoned: {e}")))?;
        *secret = fresh;
        drop(secret);

        log::warn!("signing secret rotated; all outstanding sessions revoked");
        Ok(())
    }
}

fn sign(secret: &SigningSecret, payload: &[u8]) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(&secret.0).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().into()
}
