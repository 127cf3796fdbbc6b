//! Producer handle onto a session's outbound channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kview_core::Notification;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::metrics::RELAY_NOTIFICATIONS_DROPPED_TOTAL;

/// Result of a publish attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Enqueued.
    Sent,
    /// Channel full; the notification was discarded.
    Dropped,
    /// The consumer is gone; the producer should stop.
    Closed,
}

/// Per-session count of notifications dropped on a full channel.
///
/// Holds no sender, so keeping one does not keep the channel open.
#[derive(Clone, Debug, Default)]
pub struct DropCounter(Arc<AtomicU64>);

impl DropCounter {
    /// Drops recorded so far.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Cloneable producer side of the outbound channel.
///
/// Publishing never blocks: a full channel drops the notification and
/// bumps the per-session drop counter.
#[derive(Clone, Debug)]
pub struct Publisher {
    tx: mpsc::Sender<Notification>,
    dropped: DropCounter,
}

impl Publisher {
    /// Wrap a sender with a fresh drop counter.
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self {
            tx,
            dropped: DropCounter::default(),
        }
    }

    /// Try to enqueue a notification.
    pub fn publish(&self, notification: Notification) -> PublishOutcome {
        match self.tx.try_send(notification) {
            Ok(()) => PublishOutcome::Sent,
            Err(TrySendError::Full(n)) => {
                let total = self.dropped.bump();
                counter!(RELAY_NOTIFICATIONS_DROPPED_TOTAL).increment(1);
                warn!(
                    kind = %n.kind,
                    action = %n.action,
                    dropped_total = total,
                    "outbound channel full, dropping notification"
                );
                PublishOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => PublishOutcome::Closed,
        }
    }

    /// Counter shared by every clone of this publisher.
    pub fn drop_counter(&self) -> DropCounter {
        self.dropped.clone()
    }
}
