//! Obfuscation codec for sensitive slots.
//!
//! Sensitive values are written as a cipher envelope:
//!
//! ```text
//! ENC_ + base64( xor( base64( percent_encode(json) ), CIPHER_KEY ) )
//! ```
//!
//! This keeps customer records and credentials from showing up in plain text
//! when someone browses the storage directory. It is not encryption: the key
//! is embedded right here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Prefix marking a stored value as a cipher envelope.
pub const ENVELOPE_MARKER: &str = "ENC_";

/// Repeating XOR key. Not a secret.
const CIPHER_KEY: &[u8] = b"shopkeep-local-vault-2024";

/// Substrings that mark a slot key as sensitive.
///
/// A key is sensitive if it contains any of these anywhere, so both
/// `shopkeep-customers` and `app-customers` match.
pub const SENSITIVE_KEYS: &[&str] = &[
    "api-key",
    "auth-config",
    "customers",
    "sales",
    "expenses",
    "staff",
    "telegram",
    "supabase-config",
];

/// Returns true if values stored under `key` must be obfuscated at rest.
pub fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|needle| key.contains(needle))
}

/// Returns true if `stored` is a cipher envelope rather than plain JSON.
pub fn is_envelope(stored: &str) -> bool {
    stored.starts_with(ENVELOPE_MARKER)
}

/// Encodes a serializable value into a cipher envelope.
///
/// Returns an empty string if the value cannot be serialized. An empty string
/// is never a valid envelope and callers treat it as "nothing to persist".
pub fn encode<T: Serialize + ?Sized>(value: &T) -> String {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("Failed to serialize value for encoding: {}", e);
            return String::new();
        }
    };

    let escaped = urlencoding::encode(&json);
    let inner = STANDARD.encode(escaped.as_bytes());
    let mixed = xor(inner.as_bytes());

    format!("{}{}", ENVELOPE_MARKER, STANDARD.encode(mixed))
}

/// Decodes stored text into a JSON value.
///
/// Text without the envelope marker is parsed as plain JSON, which covers
/// values written before a key became sensitive. Returns `None` whenever any
/// step fails.
pub fn decode(stored: &str) -> Option<Value> {
    match stored.strip_prefix(ENVELOPE_MARKER) {
        Some(blob) => decode_envelope(blob),
        None => serde_json::from_str(stored).ok(),
    }
}

/// Decodes stored text straight into `T`.
pub fn decode_as<T: DeserializeOwned>(stored: &str) -> Option<T> {
    decode(stored).and_then(|value| serde_json::from_value(value).ok())
}

fn decode_envelope(blob: &str) -> Option<Value> {
    let mixed = STANDARD.decode(blob).ok()?;
    let inner = xor(&mixed);
    let escaped = STANDARD.decode(inner).ok()?;
    let escaped = String::from_utf8(escaped).ok()?;
    let json = urlencoding::decode(&escaped).ok()?;
    serde_json::from_str(&json).ok()
}

fn xor(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .zip(CIPHER_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}
