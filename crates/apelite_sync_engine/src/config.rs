//! Process-level configuration for reaching the remote store.

use std::time::Duration;

/// Configuration of the HTTP remote store client.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the remote document gateway.
    pub base_url: String,
    /// Timeout of every data request.
    pub request_timeout: Duration,
    /// Timeout of the reachability ping.
    pub ping_timeout: Duration,
}

impl RemoteConfig {
    /// Creates a configuration for `base_url` with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the ping timeout.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8787")
    }
}
