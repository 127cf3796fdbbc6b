//! Graceful shutdown: one root token plus a tracker for live sessions.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Owns the root cancellation token and tracks every running session.
///
/// Session tokens are children of [`token`](Self::token), so
/// [`shutdown`](Self::shutdown) tears every session down.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// The root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the root token.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a session future so [`drain`](Self::drain) waits for it.
    pub fn track<F: Future>(&self, session: F) -> impl Future<Output = F::Output> + use<F> {
        self.sessions.track_future(session)
    }

    /// Sessions currently running.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel everything and wait up to `timeout` for tracked sessions.
    ///
    /// Returns `false` if sessions were still running at the deadline.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.shutdown();
        let _ = self.sessions.close();
        info!(
            sessions = self.sessions.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for sessions to close"
        );

        if tokio::time::timeout(timeout, self.sessions.wait()).await.is_err() {
            warn!(
                remaining = self.sessions.len(),
                "shutdown timed out after {timeout:?}, some sessions may still be running"
            );
            return false;
        }
        true
    }
}
