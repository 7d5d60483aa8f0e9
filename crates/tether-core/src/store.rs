//! The single owner of persisted session data.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::credential::Credential;
use crate::storage::Storage;

/// Fixed names under which session data is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    /// Primary application session credential.
    AuthToken,
    /// Credential for the external partner domain.
    ExternalToken,
    /// Identity label of the signed-in user.
    UserEmail,
    /// How the user signed in (e.g. `google`, `line`).
    LoginMethod,
}

impl CredentialKey {
    /// Every key, in the order they are cleared.
    pub const ALL: [CredentialKey; 4] = [
        CredentialKey::AuthToken,
        CredentialKey::ExternalToken,
        CredentialKey::UserEmail,
        CredentialKey::LoginMethod,
    ];

    /// The storage key name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::AuthToken => "auth_token",
            CredentialKey::ExternalToken => "jwt_token",
            CredentialKey::UserEmail => "user_email",
            CredentialKey::LoginMethod => "login_method",
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared handle to persisted credentials and labels.
///
/// The store never fails towards its callers: backend errors are logged and
/// reads degrade to `None`, which every consumer already treats as "no usable
/// credential".
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn Storage>,
}

impl CredentialStore {
    /// Wrap a storage backend.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Read a raw value.
    pub fn get(&self, key: CredentialKey) -> Option<String> {
        match self.storage.get(key.as_str()) {
            Ok(value) => value,
            Err(e) => {
                warn!(%key, error = %e, "Failed to read from storage");
                None
            }
        }
    }

    /// Write a raw value.
    pub fn set(&self, key: CredentialKey, value: &str) {
        if let Err(e) = self.storage.set(key.as_str(), value) {
            warn!(%key, error = %e, "Failed to write to storage");
        }
    }

    /// Delete a value.
    pub fn remove(&self, key: CredentialKey) {
        if let Err(e) = self.storage.remove(key.as_str()) {
            warn!(%key, error = %e, "Failed to remove from storage");
        }
    }

    /// Delete every persisted key.
    pub fn clear_all(&self) {
        for key in CredentialKey::ALL {
            self.remove(key);
        }
    }

    /// Read a value as a credential.
    pub fn credential(&self, key: CredentialKey) -> Option<Credential> {
        self.get(key).map(Credential::new)
    }

    /// Seconds until the credential under `key` expires; 0 when absent.
    pub fn remaining_seconds(&self, key: CredentialKey) -> u64 {
        self.credential(key)
            .map(|c| c.remaining_seconds())
            .unwrap_or(0)
    }

    /// True when the credential under `key` is absent, malformed or expired.
    pub fn is_expired(&self, key: CredentialKey) -> bool {
        self.remaining_seconds(key) == 0
    }

    /// True when the credential under `key` has less than
    /// `threshold_minutes` left.
    pub fn is_expiring_soon(&self, key: CredentialKey, threshold_minutes: u64) -> bool {
        self.remaining_seconds(key) < threshold_minutes.saturating_mul(60)
    }

    pub fn auth_token(&self) -> Option<Credential> {
        self.credential(CredentialKey::AuthToken)
    }

    pub fn set_auth_token(&self, credential: &Credential) {
        self.set(CredentialKey::AuthToken, credential.as_str());
    }

    pub fn external_token(&self) -> Option<Credential> {
        self.credential(CredentialKey::ExternalToken)
    }

    pub fn set_external_token(&self, credential: &Credential) {
        self.set(CredentialKey::ExternalToken, credential.as_str());
    }

    pub fn user_email(&self) -> Option<String> {
        self.get(CredentialKey::UserEmail)
    }

    pub fn set_user_email(&self, email: &str) {
        self.set(CredentialKey::UserEmail, email);
    }

    pub fn login_method(&self) -> Option<String> {
        self.get(CredentialKey::LoginMethod)
    }

    pub fn set_login_method(&self, method: &str) {
        self.set(CredentialKey::LoginMethod, method);
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("storage", &"[dyn Storage]")
            .finish()
    }
}
