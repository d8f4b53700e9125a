//! Defensive validation of untrusted scanned QR payloads.
//!
//! A scanned string is hostile input: it may be forged, malformed, or
//! built to exhaust the parser. Nothing from a scan reaches the network
//! verifier or the screen until it has passed this module's pipeline —
//! sanitize, then a short-circuiting sequence of structural and
//! semantic checks. Rejecting is always safe; accepting requires every
//! check to pass.
//!
//! Unlike the credential and session modules, failures here carry a
//! specific reason: the input is not secret, and precise feedback helps
//! the operator re-scan correctly.
//!
//! Expected wire format (produced by the external issuer): a JSON
//! object, optionally base64-wrapped, with required keys `p`
//! (presentation id), `h` (holder DID), `exp` (epoch seconds), and
//! optional `n` (nonce) and `s` (signature).

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::clock::Clock;

/// Minimum accepted payload size in bytes.
pub const MIN_PAYLOAD_BYTES: usize = 50;

/// Maximum accepted payload size in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 10_240;

const MAX_NESTING_DEPTH: usize = 10;
const MAX_KEY_CHARS: usize = 100;
const MAX_STRING_VALUE_CHARS: usize = 2048;
const PRESENTATION_ID_CHARS: std::ops::RangeInclusive<usize> = 8..=128;
const SIGNATURE_CHARS: std::ops::RangeInclusive<usize> = 32..=512;

/// Reasons a scanned payload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The payload is empty.
    #[error("payload is empty")]
    EmptyInput,

    /// The payload is smaller than [`MIN_PAYLOAD_BYTES`].
    #[error("payload is too small")]
    TooSmall,

    /// The payload is larger than [`MAX_PAYLOAD_BYTES`].
    #[error("payload is too large")]
    TooLarge,

    /// The payload contains control characters.
    #[error("payload contains control characters")]
    InvalidCharacters,

    /// The payload is neither JSON nor base64-wrapped JSON.
    #[error("payload is not structured data")]
    InvalidFormat,

    /// The parsed payload is not an object.
    #[error("payload root is not an object")]
    InvalidStructure,

    /// Nesting exceeds the allowed depth.
    #[error("payload nesting is too deep")]
    NestingTooDeep,

    /// An object key exceeds the allowed length.
    #[error("key '{key}' is too long")]
    KeyTooLong {
        /// The offending key, truncated for display.
        key: String,
    },

    /// A string value exceeds the allowed length.
    #[error("value under '{key}' is too long")]
    ValueTooLong {
        /// The key whose value is too long.
        key: String,
    },

    /// A required field is absent.
    #[error("required field '{field}' is missing")]
    MissingField {
        /// The missing field.
        field: &'static str,
    },

    /// A field is present but malformed.
    #[error("field '{field}' is malformed")]
    InvalidField {
        /// The malformed field.
        field: &'static str,
    },

    /// The optional signature field is malformed.
    #[error("signature field is malformed")]
    InvalidSignature,

    /// The payload's expiry is in the past.
    #[error("payload has expired")]
    Expired,
}

/// Nonce value attached to a presentation, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrNonce {
    /// Integer nonce.
    Integer(i64),
    /// String nonce.
    Text(String),
}

/// A fully validated scan result.
///
/// The extracted fields are first-class so downstream code (the network
/// verifier call, the result screen) never re-parses untrusted input.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQrPayload {
    /// Presentation id (`p`).
    pub presentation_id: String,
    /// Holder identifier (`h`), a DID.
    pub holder_identifier: String,
    /// Expiry (`exp`), Unix seconds, strictly in the future at
    /// validation time.
    pub expires_at: u64,
    /// Optional nonce (`n`).
    pub nonce: Option<QrNonce>,
    /// Optional opaque signature (`s`); verified cryptographically by
    /// the external verifier, only shape-checked here.
    pub signature: Option<String>,
    /// The full parsed claim set.
    pub claims: Map<String, Value>,
}

/// Sanitizer and validator for scanned QR strings.
pub struct QrPayloadValidator {
    clock: Arc<dyn Clock>,
}

impl QrPayloadValidator {
    /// Creates a validator using the given time source for expiry
    /// checks.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Strips control and null bytes from raw scanner output.
    ///
    /// Semantic content is never altered: only the control characters
    /// rejected by [`QrPayloadValidator::validate`] are removed, and
    /// tab/newline/carriage-return survive.
    #[must_use]
    pub fn sanitize(raw: &str) -> String {
        raw.chars().filter(|c| !is_stripped_control(*c)).collect()
    }

    /// Runs the full validation pipeline, short-circuiting on the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the specific [`ValidationError`] for the first check the
    /// payload fails.
    pub fn validate(&self, cleaned: &str) -> Result<ParsedQrPayload, ValidationError> {
        if cleaned.is_empty() {
            return Err(ValidationError::EmptyInput);
        }
        if cleaned.len() < MIN_PAYLOAD_BYTES {
            return Err(ValidationError::TooSmall);
        }
        if cleaned.len() > MAX_PAYLOAD_BYTES {
            return Err(ValidationError::TooLarge);
        }
        if cleaned.chars().any(is_stripped_control) {
            return Err(ValidationError::InvalidCharacters);
        }

        let value = parse_structured(cleaned)?;
        let Value::Object(claims) = value else {
            return Err(ValidationError::InvalidStructure);
        };

        if depth_of_object(&claims) > MAX_NESTING_DEPTH {
            return Err(ValidationError::NestingTooDeep);
        }
        check_lengths(&claims)?;

        let presentation_id = required_presentation_id(&claims)?;
        let holder_identifier = required_holder_did(&claims)?;
        let expires_at = required_expiry(&claims)?;
        if expires_at <= self.clock.now_unix() {
            return Err(ValidationError::Expired);
        }

        let nonce = optional_nonce(&claims)?;
        let signature = optional_signature(&claims)?;

        Ok(ParsedQrPayload {
            presentation_id,
            holder_identifier,
            expires_at,
            nonce,
            signature,
            claims,
        })
    }
}

/// Control characters both stripped by sanitize and rejected by
/// validate. Tab (0x09), LF (0x0A), and CR (0x0D) are allowed.
const fn is_stripped_control(c: char) -> bool {
    matches!(c,
        '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}')
}

/// Parses the payload as JSON directly, or as base64-wrapped JSON as a
/// fallback.
fn parse_structured(cleaned: &str) -> Result<Value, ValidationError> {
    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }
    let decoded = STANDARD
        .decode(cleaned.trim())
        .map_err(|_| ValidationError::InvalidFormat)?;
    let inner = std::str::from_utf8(&decoded).map_err(|_| ValidationError::InvalidFormat)?;
    serde_json::from_str::<Value>(inner).map_err(|_| ValidationError::InvalidFormat)
}

fn depth_of_value(value: &Value) -> usize {
    match value {
        Value::Object(map) => depth_of_object(map),
        Value::Array(items) => {
            1 + items.iter().map(depth_of_value).max().unwrap_or(0)
        }
        _ => 0,
    }
}

fn depth_of_object(map: &Map<String, Value>) -> usize {
    1 + map.values().map(depth_of_value).max().unwrap_or(0)
}

/// Recursively enforces key and string-value length bounds.
fn check_lengths(map: &Map<String, Value>) -> Result<(), ValidationError> {
    for (key, value) in map {
        if key.chars().count() > MAX_KEY_CHARS {
            return Err(ValidationError::KeyTooLong {
                key: key.chars().take(MAX_KEY_CHARS).collect(),
            });
        }
        check_value_lengths(key, value)?;
    }
    Ok(())
}

fn check_value_lengths(key: &str, value: &Value) -> Result<(), ValidationError> {
    match value {
        Value::String(s) if s.chars().count() > MAX_STRING_VALUE_CHARS => {
            Err(ValidationError::ValueTooLong {
                key: key.to_string(),
            })
        }
        Value::Object(map) => check_lengths(map),
        Value::Array(items) => {
            for item in items {
                check_value_lengths(key, item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn required_presentation_id(claims: &Map<String, Value>) -> Result<String, ValidationError> {
    let value = claims
        .get("p")
        .ok_or(ValidationError::MissingField { field: "p" })?;
    let id = value
        .as_str()
        .ok_or(ValidationError::InvalidField { field: "p" })?;
    let length_ok = PRESENTATION_ID_CHARS.contains(&id.chars().count());
    let charset_ok = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-'));
    if length_ok && charset_ok {
        Ok(id.to_string())
    } else {
        Err(ValidationError::InvalidField { field: "p" })
    }
}

/// Accepts `did:<method>:<id>` where the method is lowercase
/// alphanumeric and the method-specific id is non-empty.
fn required_holder_did(claims: &Map<String, Value>) -> Result<String, ValidationError> {
    let value = claims
        .get("h")
        .ok_or(ValidationError::MissingField { field: "h" })?;
    let did = value
        .as_str()
        .ok_or(ValidationError::InvalidField { field: "h" })?;

    let rest = did
        .strip_prefix("did:")
        .ok_or(ValidationError::InvalidField { field: "h" })?;
    let (method, id) = rest
        .split_once(':')
        .ok_or(ValidationError::InvalidField { field: "h" })?;
    let method_ok = !method.is_empty()
        && method
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let id_ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'));
    if method_ok && id_ok {
        Ok(did.to_string())
    } else {
        Err(ValidationError::InvalidField { field: "h" })
    }
}

fn required_expiry(claims: &Map<String, Value>) -> Result<u64, ValidationError> {
    let value = claims
        .get("exp")
        .ok_or(ValidationError::MissingField { field: "exp" })?;
    // Must be a positive integer; floats and numeric strings are not
    // accepted.
    match value.as_u64() {
        Some(exp) if exp > 0 => Ok(exp),
        _ => Err(ValidationError::InvalidField { field: "exp" }),
    }
}

fn optional_nonce(claims: &Map<String, Value>) -> Result<Option<QrNonce>, ValidationError> {
    let Some(value) = claims.get("n") else {
        return Ok(None);
    };
    if let Some(n) = value.as_i64() {
        return Ok(Some(QrNonce::Integer(n)));
    }
    if let Some(s) = value.as_str() {
        return Ok(Some(QrNonce::Text(s.to_string())));
    }
    Err(ValidationError::InvalidField { field: "n" })
}

fn optional_signature(claims: &Map<String, Value>) -> Result<Option<String>, ValidationError> {
    let Some(value) = claims.get("s") else {
        return Ok(None);
    };
    let sig = value.as_str().ok_or(ValidationError::InvalidSignature)?;
    if !SIGNATURE_CHARS.contains(&sig.chars().count()) {
        return Err(ValidationError::InvalidSignature);
    }
    if is_hex(sig) || is_base64(sig) {
        Ok(Some(sig.to_string()))
    } else {
        Err(ValidationError::InvalidSignature)
    }
}

fn is_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Charset check only; the signature is opaque to this core and is
/// verified by the external verifier service.
fn is_base64(s: &str) -> bool {
    let trimmed = s.trim_end_matches('=');
    if s.len() - trimmed.len() > 2 {
        return false;
    }
    trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '-' | '_'))
}
