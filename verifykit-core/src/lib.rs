//! On-device security core for a credential-verification terminal.
//!
//! Everything the terminal's presentation layer treats as
//! security-sensitive lives here:
//!
//! * [`keys`] — generation, persistence, and rotation of the symmetric
//!   keys that open the terminal's encrypted local databases.
//! * [`credentials`] — salted, iterated password hashing for local
//!   staff accounts, password policy, and failed-login lockout.
//! * [`session`] — stateless, HMAC-signed session tokens with global
//!   revocation via signing-secret rotation.
//! * [`auth`] — the authentication facade and role-based access
//!   control composed over the two modules above.
//! * [`qr`] — a defensive parser/validator for untrusted scanned QR
//!   payloads, run before any payload reaches the network verifier.
//!
//! Secrets are only ever persisted through the
//! [`verifykit_secure_store::SecretStore`] abstraction; the core never
//! touches plain files. The networked trust decision about a scanned
//! credential is out of scope — the core hands the verifier a
//! sanitized, structurally validated payload and nothing else.

#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod auth;
pub mod clock;
pub mod credentials;
pub mod error;
pub mod keys;
pub mod logger;
pub mod qr;
pub mod session;

pub use auth::{role_allows, AuthenticationFacade, Permission};
pub use clock::{Clock, SystemClock};
pub use credentials::{Account, AccountId, CredentialStore, Role};
pub use error::{CoreError, CoreResult};
pub use keys::{DatabaseId, DatabaseKey, KeyManager};
pub use qr::{ParsedQrPayload, QrNonce, QrPayloadValidator, ValidationError};
pub use session::{SessionTokenService, TokenClaims};
