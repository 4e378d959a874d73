//! Connectivity state with change notifications.
//!
//! Subscribers receive a `watch::Receiver<bool>`; the current value is readable
//! right away and `changed()` resolves on every transition. Dropping the
//! receiver unsubscribes.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Host probed by default: the Gemini API endpoint itself
pub const DEFAULT_PROBE_TARGET: &str = "generativelanguage.googleapis.com:443";

#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_connected: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_connected);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Publish a new state; subscribers are only woken when it actually changes
    pub fn set(&self, connected: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });
        if changed {
            tracing::info!(connected, "connectivity changed");
        }
        changed
    }

    /// Try a TCP connection to `target` (`host:port`)
    pub async fn probe(target: &str, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect(target)).await,
            Ok(Ok(_))
        )
    }

    /// Probe `target` every `interval` and publish the result until the monitor
    /// has no subscribers left
    pub fn spawn_probe(&self, target: String, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reachable = Self::probe(&target, interval.min(Duration::from_secs(5))).await;
                monitor.set(reachable);
                if monitor.tx.receiver_count() == 0 {
                    tracing::debug!("no connectivity subscribers left, stopping probe");
                    break;
                }
            }
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
