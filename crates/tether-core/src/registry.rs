//! Multi-domain credential orchestration.
//!
//! The [`ServiceRegistry`] holds one [`TokenService`] per credential domain and
//! is the only place that decides a session is unrecoverable. Every terminal
//! failure (an already-expired credential, a failed refresh) clears the
//! [`CredentialStore`] and invokes the [`LogoutHandler`] supplied at
//! construction.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared, join_all};
use tracing::{debug, error, info, instrument, warn};

use crate::credential::Credential;
use crate::store::CredentialStore;
use crate::traits::TokenService;

/// Default "expiring soon" window, in minutes.
pub const DEFAULT_THRESHOLD_MINUTES: u64 = 5;

type RefreshFuture = Shared<BoxFuture<'static, Option<Credential>>>;

/// Callback invoked when the session cannot be recovered.
#[derive(Clone)]
pub struct LogoutHandler(Arc<dyn Fn() + Send + Sync>);

impl LogoutHandler {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn call(&self) {
        (self.0)()
    }
}

impl fmt::Debug for LogoutHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogoutHandler")
    }
}

/// Registry of credential domains with coalesced refresh.
///
/// Cheap to clone; clones share services, in-flight refreshes and the logout
/// handler. Build one at startup and hand clones to every consumer.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    store: CredentialStore,
    on_logout: LogoutHandler,
    services: Mutex<HashMap<String, Arc<dyn TokenService>>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_refresh_id: AtomicU64,
}

struct InFlight {
    id: u64,
    future: RefreshFuture,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ServiceRegistry {
    /// Create a registry that clears `store` and calls `on_logout` on
    /// terminal failure.
    pub fn new(store: CredentialStore, on_logout: LogoutHandler) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                on_logout,
                services: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                next_refresh_id: AtomicU64::new(1),
            }),
        }
    }

    /// The store this registry clears on logout.
    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Register a service, replacing any previous one with the same name.
    pub fn register(&self, service: Arc<dyn TokenService>) {
        let name = service.name().to_string();
        lock(&self.inner.services).insert(name.clone(), service);
        info!(service = %name, "Registered token service");
    }

    /// Remove a service and forget any refresh in flight for it.
    pub fn unregister(&self, name: &str) {
        lock(&self.inner.services).remove(name);
        lock(&self.inner.in_flight).remove(name);
        debug!(service = %name, "Unregistered token service");
    }

    /// Names of all registered services, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner.services).keys().cloned().collect();
        names.sort();
        names
    }

    /// A registered service by name.
    pub fn service(&self, name: &str) -> Option<Arc<dyn TokenService>> {
        lock(&self.inner.services).get(name).cloned()
    }

    /// The current credential of a service, without any validity checks.
    pub fn token(&self, name: &str) -> Option<Credential> {
        self.service(name).and_then(|s| s.token())
    }

    /// Refresh a service, joining any refresh already in flight.
    ///
    /// Unlike [`ensure_valid_token`](Self::ensure_valid_token) this never
    /// escalates to logout; a failure is reported as `None`.
    pub async fn refresh(&self, name: &str) -> Option<Credential> {
        let Some(service) = self.service(name) else {
            error!(service = %name, "Refresh requested for unregistered service");
            return None;
        };
        self.coalesced_refresh(service).await
    }

    /// Return a usable credential for `name`, refreshing or logging out as
    /// needed.
    ///
    /// - unknown service: `None`
    /// - already expired: logout, `None` (no refresh is attempted)
    /// - expiring within `threshold_minutes`: coalesced refresh; logout and
    ///   `None` if it fails
    /// - otherwise: the current credential
    #[instrument(skip(self))]
    pub async fn ensure_valid_token(
        &self,
        name: &str,
        threshold_minutes: u64,
    ) -> Option<Credential> {
        let Some(service) = self.service(name) else {
            error!("Unregistered service");
            return None;
        };

        if service.is_expired() {
            info!("Credential expired, session must be re-established");
            self.logout();
            return None;
        }

        if service.is_expiring_soon(threshold_minutes) {
            info!("Credential expiring soon, refreshing");
            let refreshed = self.coalesced_refresh(service).await;
            if refreshed.is_none() {
                error!("Refresh failed, logging out");
                self.logout();
            }
            return refreshed;
        }

        service.token()
    }

    /// Refresh every service that is expiring soon, concurrently.
    ///
    /// Returns `true` only if every such service ends up with a credential.
    pub async fn refresh_expiring_soon(&self, threshold_minutes: u64) -> bool {
        let due: Vec<String> = self
            .snapshot()
            .into_iter()
            .filter(|service| service.is_expiring_soon(threshold_minutes))
            .map(|service| service.name().to_string())
            .collect();

        if due.is_empty() {
            return true;
        }

        debug!(count = due.len(), "Refreshing services expiring soon");
        let results = join_all(
            due.iter()
                .map(|name| self.ensure_valid_token(name, threshold_minutes)),
        )
        .await;

        results.iter().all(Option::is_some)
    }

    /// Log out if any registered service is already expired.
    ///
    /// Returns whether every service is still valid.
    pub fn check_all_services(&self) -> bool {
        let mut services = self.snapshot();
        services.sort_by(|a, b| a.name().cmp(b.name()));

        for service in services {
            if service.is_expired() {
                info!(service = %service.name(), "Credential expired, session must be re-established");
                self.logout();
                return false;
            }
        }
        true
    }

    /// Clear all persisted session data and notify the application.
    pub fn logout(&self) {
        warn!("Logging out");
        self.inner.store.clear_all();
        self.inner.on_logout.call();
    }

    fn snapshot(&self) -> Vec<Arc<dyn TokenService>> {
        lock(&self.inner.services).values().cloned().collect()
    }

    fn coalesced_refresh(&self, service: Arc<dyn TokenService>) -> RefreshFuture {
        let name = service.name().to_string();
        let mut in_flight = lock(&self.inner.in_flight);

        if let Some(existing) = in_flight.get(&name) {
            debug!(service = %name, "Joining refresh already in flight");
            return existing.future.clone();
        }

        let id = self.inner.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(&self.inner);
        let future = {
            let name = name.clone();
            async move {
                info!(service = %name, "Refreshing credential");
                let result = match service.refresh().await {
                    Ok(credential) => {
                        info!(service = %name, "Credential refreshed");
                        Some(credential)
                    }
                    Err(e) => {
                        error!(service = %name, error = %e, "Credential refresh failed");
                        None
                    }
                };
                if let Some(registry) = Weak::upgrade(&registry) {
                    registry.finish_refresh(&name, id);
                }
                result
            }
        }
        .boxed()
        .shared();

        in_flight.insert(
            name,
            InFlight {
                id,
                future: future.clone(),
            },
        );
        future
    }
}

impl RegistryInner {
    fn finish_refresh(&self, name: &str, id: u64) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.get(name).is_some_and(|entry| entry.id == id) {
            in_flight.remove(name);
        }
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services())
            .finish()
    }
}
