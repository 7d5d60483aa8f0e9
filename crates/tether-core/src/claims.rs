//! Non-verifying credential payload introspection.
//!
//! A credential is expected to be three dot-separated segments whose middle
//! segment is URL-safe base64 encoded JSON. Only the expiry claim matters to
//! this layer. Anything that does not fit that shape decodes to `None` and is
//! treated as already expired; nothing here returns an error or panics.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// URL-safe alphabet, accepting payloads with or without `=` padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims carried in a credential payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject the credential was issued for. Numeric subjects are kept in
    /// their decimal form; any other type is dropped.
    #[serde(default, deserialize_with = "lenient_subject", skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiry, in seconds since the Unix epoch. Non-numeric values are dropped.
    #[serde(default, deserialize_with = "lenient_expiry", skip_serializing_if = "Option::is_none")]
    pub exp: Option<f64>,

    /// Every other claim, retained but unused.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn lenient_subject<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(subject) => Some(subject),
        Value::Number(subject) => Some(subject.to_string()),
        _ => None,
    })
}

fn lenient_expiry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(exp) => exp.as_f64(),
        _ => None,
    })
}

/// Decode the claims of a credential without verifying its signature.
pub fn decode(credential: &str) -> Option<Claims> {
    let segments: Vec<&str> = credential.split('.').collect();
    if segments.len() != 3 {
        debug!(segments = segments.len(), "credential is not three segments");
        return None;
    }

    let bytes = match PAYLOAD_ENGINE.decode(segments[1]) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "credential payload is not base64url");
            return None;
        }
    };

    match serde_json::from_slice::<Claims>(&bytes) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!(error = %e, "credential payload is not a claims object");
            None
        }
    }
}

/// Seconds of lifetime left at `now` (seconds since the epoch).
pub fn remaining_seconds_at(credential: &str, now: i64) -> u64 {
    let Some(exp) = decode(credential).and_then(|claims| claims.exp) else {
        return 0;
    };

    let remaining = exp - now as f64;
    if remaining.is_nan() || remaining <= 0.0 {
        0
    } else {
        remaining as u64
    }
}

/// Seconds of lifetime left; 0 when expired or when no expiry can be read.
pub fn remaining_seconds(credential: &str) -> u64 {
    remaining_seconds_at(credential, Utc::now().timestamp())
}

/// True when no usable lifetime remains.
pub fn is_expired(credential: &str) -> bool {
    remaining_seconds(credential) == 0
}

/// True when less than `threshold_minutes` of lifetime remains.
pub fn is_expiring_soon(credential: &str, threshold_minutes: u64) -> bool {
    remaining_seconds(credential) < threshold_minutes.saturating_mul(60)
}
