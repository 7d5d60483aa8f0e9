//! Token service refreshed against an HTTP endpoint.

use std::fmt;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, instrument, warn};

use tether_core::error::AuthError;
use tether_core::{Credential, CredentialKey, CredentialStore, Endpoint, Result, TokenService};

use crate::error::from_reqwest;

/// Registry name of the application session service.
pub const PRIMARY_SERVICE: &str = "app";

/// Path of the application session refresh endpoint.
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

const DEFAULT_RESPONSE_FIELD: &str = "access_token";

/// A credential domain whose credential lives in the [`CredentialStore`] and is
/// renewed by POSTing the current credential to a refresh URL.
///
/// The refresh endpoint must answer 2xx with a JSON object carrying the new
/// credential (by default under `access_token`); anything else is a refresh
/// failure.
#[derive(Clone)]
pub struct EndpointService {
    name: String,
    key: CredentialKey,
    store: CredentialStore,
    http: reqwest::Client,
    refresh_url: String,
    response_field: String,
}

impl EndpointService {
    pub fn new(
        name: impl Into<String>,
        key: CredentialKey,
        store: CredentialStore,
        refresh_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            key,
            store,
            http: reqwest::Client::new(),
            refresh_url: refresh_url.into(),
            response_field: DEFAULT_RESPONSE_FIELD.to_string(),
        }
    }

    /// The application session service: [`CredentialKey::AuthToken`] renewed
    /// at [`REFRESH_PATH`] on `api`.
    pub fn primary(store: CredentialStore, api: &Endpoint) -> Self {
        Self::new(
            PRIMARY_SERVICE,
            CredentialKey::AuthToken,
            store,
            api.join(REFRESH_PATH),
        )
    }

    /// Share an existing HTTP client (connection pool, timeouts).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Read the new credential from a different JSON field.
    pub fn with_response_field(mut self, field: impl Into<String>) -> Self {
        self.response_field = field.into();
        self
    }

    pub fn key(&self) -> CredentialKey {
        self.key
    }
}

#[async_trait]
impl TokenService for EndpointService {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_expired(&self) -> bool {
        self.store.is_expired(self.key)
    }

    fn is_expiring_soon(&self, threshold_minutes: u64) -> bool {
        self.store.is_expiring_soon(self.key, threshold_minutes)
    }

    #[instrument(skip(self), fields(service = %self.name, url = %self.refresh_url))]
    async fn refresh(&self) -> Result<Credential> {
        let current = self.token().ok_or_else(|| AuthError::MissingCredential {
            service: self.name.clone(),
        })?;

        let response = self
            .http
            .post(&self.refresh_url)
            .header(AUTHORIZATION, current.bearer())
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Refresh endpoint rejected credential");
            return Err(AuthError::RefreshRejected {
                status: status.as_u16(),
            }
            .into());
        }

        let body: serde_json::Value = response.json().await.map_err(from_reqwest)?;
        let fresh = body
            .get(&self.response_field)
            .and_then(serde_json::Value::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AuthError::MissingField {
                field: self.response_field.clone(),
            })?;

        let credential = Credential::new(fresh);
        self.store.set(self.key, credential.as_str());
        debug!("Stored refreshed credential");
        Ok(credential)
    }

    fn token(&self) -> Option<Credential> {
        self.store.credential(self.key)
    }
}

impl fmt::Debug for EndpointService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointService")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("refresh_url", &self.refresh_url)
            .finish()
    }
}
