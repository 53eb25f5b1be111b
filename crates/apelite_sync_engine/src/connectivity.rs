//! Remote reachability.

use crate::remote::RemoteStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Lazily pings the remote store; there is no background polling.
pub struct ConnectivityMonitor {
    remote: Arc<dyn RemoteStore>,
    online: AtomicBool,
}

impl ConnectivityMonitor {
    /// Creates a monitor that assumes offline until the first ping.
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            online: AtomicBool::new(false),
        }
    }

    /// Pings the remote and records the result.
    pub async fn is_online(&self) -> bool {
        let online = self.remote.ping().await;
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            info!(online, "remote connectivity changed");
        }
        online
    }

    /// Result of the last ping.
    pub fn last_known(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.last_known())
            .finish()
    }
}
