//! Bearer credential type.

use std::fmt;

use crate::claims::{self, Claims};

/// An opaque bearer credential.
///
/// Credentials are usually JWT-shaped (`header.payload.signature`); tether only
/// ever reads the payload to learn when the credential expires, and never
/// checks the signature.
///
/// # Security
///
/// - Never logged or displayed in Debug output
/// - Compare and persist by value; there is no owner beyond the store
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw credential string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw value for use in authorization headers and storage.
    ///
    /// # Security
    ///
    /// Never log or display this value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the credential and return the raw value.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Decode the payload claims, if the credential is well-formed.
    pub fn claims(&self) -> Option<Claims> {
        claims::decode(&self.0)
    }

    /// Seconds until expiry; 0 if unknown or already expired.
    pub fn remaining_seconds(&self) -> u64 {
        claims::remaining_seconds(&self.0)
    }

    /// True when no usable lifetime remains.
    pub fn is_expired(&self) -> bool {
        claims::is_expired(&self.0)
    }

    /// True when less than `threshold_minutes` of lifetime remains.
    pub fn is_expiring_soon(&self, threshold_minutes: u64) -> bool {
        claims::is_expiring_soon(&self.0, threshold_minutes)
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// Hide credential value in Debug output
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_hides_value_in_debug() {
        let credential = Credential::new("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("eyJ"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn bearer_header_value() {
        let credential = Credential::from("abc");
        assert_eq!(credential.bearer(), "Bearer abc");
    }

    #[test]
    fn opaque_credential_is_expired() {
        let credential = Credential::from("not-a-jwt");
        assert!(credential.claims().is_none());
        assert!(credential.is_expired());
        assert!(credential.is_expiring_soon(5));
    }
}
