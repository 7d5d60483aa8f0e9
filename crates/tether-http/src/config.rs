//! Client and channel configuration.

use std::time::Duration;

use tether_core::{DEFAULT_THRESHOLD_MINUTES, Endpoint};

use crate::service::PRIMARY_SERVICE;

/// Configuration for [`AuthenticatedClient`](crate::AuthenticatedClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Per-request timeout at the transport boundary. `None` disables it.
    pub timeout: Option<Duration>,
    /// Minutes before expiry at which a pre-emptive refresh is attempted.
    pub refresh_threshold_minutes: u64,
    /// Registry name of the service whose credential authenticates requests.
    pub primary_service: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("tether/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Some(Duration::from_secs(30)),
            refresh_threshold_minutes: DEFAULT_THRESHOLD_MINUTES,
            primary_service: PRIMARY_SERVICE.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_refresh_threshold_minutes(mut self, minutes: u64) -> Self {
        self.refresh_threshold_minutes = minutes;
        self
    }

    pub fn with_primary_service(mut self, name: impl Into<String>) -> Self {
        self.primary_service = name.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Configuration for [`ResilientChannel`](crate::ResilientChannel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Base URL; the resource identifier is appended as the last path segment.
    pub endpoint: Endpoint,
    /// First reconnect waits `2 × base_delay`, doubling from there.
    pub base_delay: Duration,
    /// Ceiling for any single reconnect delay.
    pub max_delay: Duration,
    /// Reconnects attempted after an unexpected close before giving up.
    pub max_attempts: u32,
    /// Interval between liveness probes while open.
    pub heartbeat_interval: Duration,
}

impl ChannelConfig {
    /// Defaults: 1s base delay, 30s cap, 10 attempts, 30s heartbeat.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}
