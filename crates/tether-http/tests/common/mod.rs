//! Shared helpers for tether-http integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;
use tether_core::{
    Credential, CredentialStore, Endpoint, LogoutHandler, MemoryStorage, ServiceRegistry,
};
use tether_http::{AuthenticatedClient, ClientConfig, EndpointService};
use wiremock::MockServer;

/// Mint an unsigned JWT-shaped credential expiring `seconds` from now.
pub fn credential_expiring_in(seconds: i64) -> Credential {
    let exp = chrono::Utc::now().timestamp() + seconds;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({"sub": "alice@example.com", "exp": exp}).to_string());
    Credential::new(format!("{header}.{payload}.signature"))
}

/// Helper to create an endpoint from a mock server.
pub fn mock_endpoint(server: &MockServer) -> Endpoint {
    Endpoint::new(server.uri()).unwrap()
}

/// Registry wired to an in-memory store, counting logouts.
pub struct Harness {
    pub store: CredentialStore,
    pub registry: ServiceRegistry,
    pub logouts: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new() -> Self {
        let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
        let logouts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&logouts);
        let registry = ServiceRegistry::new(
            store.clone(),
            LogoutHandler::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        Self {
            store,
            registry,
            logouts,
        }
    }

    /// Register the primary service against `server` and build a client.
    pub fn client_for(&self, server: &MockServer) -> AuthenticatedClient {
        let service = EndpointService::primary(self.store.clone(), &mock_endpoint(server));
        self.registry.register(Arc::new(service));
        AuthenticatedClient::new(self.registry.clone(), ClientConfig::default()).unwrap()
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}
