//! Session wiring: persisted credentials, the service registry and the
//! authenticated client.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tracing::debug;

use tether_core::{Credential, CredentialKey, CredentialStore, LogoutHandler, ServiceRegistry};
use tether_file::FileStorage;
use tether_http::{AuthenticatedClient, ClientConfig, EndpointService};

use crate::cli::GlobalArgs;
use crate::output;

/// Registry name of the external identity provider service.
pub const EXTERNAL_SERVICE: &str = "external";

/// Get the session file path.
fn session_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "tether").context("Could not determine data directory")?;

    let data_dir = dirs.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data directory")?;

    Ok(data_dir.join("session.json"))
}

/// Everything a command needs to act on the persisted session.
pub struct Session {
    pub store: CredentialStore,
    pub registry: ServiceRegistry,
    pub client: AuthenticatedClient,
}

impl Session {
    /// Open the session file and register the credential services.
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let path = session_path()?;
        debug!(path = %path.display(), "Opening session");

        let store = CredentialStore::new(Arc::new(FileStorage::new(path)));
        let registry = ServiceRegistry::new(
            store.clone(),
            LogoutHandler::new(|| {
                output::error("Session ended, stored credentials cleared. Run 'tether login' again.")
            }),
        );
        let client = AuthenticatedClient::new(registry.clone(), ClientConfig::default())
            .context("Failed to build HTTP client")?;

        let api = global.api()?;
        registry.register(Arc::new(
            EndpointService::primary(store.clone(), &api).with_http_client(client.http().clone()),
        ));

        // Without a stored external credential there is nothing to refresh,
        // and registering the service would read as an expired session.
        let external = global
            .external_refresh_url
            .as_ref()
            .filter(|_| store.external_token().is_some());
        if let Some(url) = external {
            registry.register(Arc::new(
                EndpointService::new(
                    EXTERNAL_SERVICE,
                    CredentialKey::ExternalToken,
                    store.clone(),
                    url.as_str(),
                )
                .with_http_client(client.http().clone()),
            ));
        }

        Ok(Self {
            store,
            registry,
            client,
        })
    }

    /// The application credential, or an error telling the user to log in.
    pub fn require_login(&self) -> Result<Credential> {
        self.store
            .auth_token()
            .context("No active session. Run 'tether login' first.")
    }
}
