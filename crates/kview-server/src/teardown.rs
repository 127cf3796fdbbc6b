//! Session end signal: one cancellation plus the reason that caused it.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent a close frame or the connection reached EOF.
    PeerClosed,
    /// No keepalive acknowledgement within the read window.
    ReadTimeout,
    /// Reading from the transport failed.
    ReadFailed(String),
    /// A write did not complete within the write deadline.
    WriteTimeout,
    /// Writing to the transport failed.
    WriteFailed(String),
    /// Every producer finished and the outbound channel closed.
    ProducersFinished,
    /// The upstream watch could not be re-opened.
    UpstreamUnavailable,
    /// Cancelled from outside (server shutdown).
    Cancelled,
}

impl SessionEnd {
    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadTimeout => "read_timeout",
            Self::ReadFailed(_) => "read_failed",
            Self::WriteTimeout => "write_timeout",
            Self::WriteFailed(_) => "write_failed",
            Self::ProducersFinished => "producers_finished",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(e) | Self::WriteFailed(e) => write!(f, "{}: {e}", self.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Shared by every loop of a session.
///
/// The first [`trigger`](Self::trigger) records its reason and cancels;
/// later triggers are ignored. Cancelling the parent token ends the session
/// with [`SessionEnd::Cancelled`].
#[derive(Clone, Debug)]
pub struct Teardown {
    token: CancellationToken,
    reason: Arc<Mutex<Option<SessionEnd>>>,
}

impl Teardown {
    /// A teardown signal that also fires when `parent` is cancelled.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Record `reason` (if first) and cancel.
    pub fn trigger(&self, reason: SessionEnd) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                debug!(reason = %reason, "session teardown triggered");
                *slot = Some(reason);
            }
        }
        self.token.cancel();
    }

    /// Whether teardown has started.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once teardown has started.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// The recorded reason, [`SessionEnd::Cancelled`] if none was given.
    pub fn reason(&self) -> SessionEnd {
        self.reason.lock().clone().unwrap_or(SessionEnd::Cancelled)
    }
}
