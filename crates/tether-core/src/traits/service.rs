//! Credential domain trait.

use async_trait::async_trait;

use crate::{Credential, Result};

/// One independent credential domain (e.g. the application session, or an
/// external partner API).
///
/// Services are registered with a [`ServiceRegistry`](crate::ServiceRegistry),
/// which decides when to call [`refresh`](TokenService::refresh) and makes sure
/// concurrent callers share a single call.
#[async_trait]
pub trait TokenService: Send + Sync {
    /// Unique name used for registration and logging.
    fn name(&self) -> &str;

    /// True when the current credential is absent, malformed or past expiry.
    fn is_expired(&self) -> bool;

    /// True when the current credential has less than `threshold_minutes` left.
    fn is_expiring_soon(&self, threshold_minutes: u64) -> bool;

    /// Obtain and persist a new credential.
    async fn refresh(&self) -> Result<Credential>;

    /// The current credential, if any.
    fn token(&self) -> Option<Credential>;
}
