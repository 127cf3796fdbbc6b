//! Outbound loop: the only writer on a session's transport.

use std::time::Duration;

use kview_core::Notification;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::teardown::{SessionEnd, Teardown};
use crate::transport::{Frame, FrameSink};

/// Timing for the outbound loop.
#[derive(Clone, Copy, Debug)]
pub struct OutboundTiming {
    /// Keepalive ping cadence.
    pub ping_interval: Duration,
    /// Deadline for each frame write.
    pub write_wait: Duration,
}

/// Drain `rx` onto `sink`, interleaving keepalive pings.
///
/// Returns the sink so the session can close it exactly once. Any write
/// failure or deadline expiry triggers teardown. When every producer has
/// dropped its sender a close frame is written and teardown is triggered.
/// Pending notifications are not drained after teardown.
pub async fn run_outbound<K: FrameSink>(
    mut sink: K,
    mut rx: mpsc::Receiver<Notification>,
    teardown: Teardown,
    timing: OutboundTiming,
) -> K {
    let mut ping = tokio::time::interval(timing.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = teardown.cancelled() => break,
            msg = rx.recv() => {
                let Some(notification) = msg else {
                    debug!("outbound channel closed");
                    if let Err(end) = write(&mut sink, Frame::Close, &teardown, timing.write_wait).await {
                        debug!(reason = %end, "close frame not delivered");
                    }
                    teardown.trigger(SessionEnd::ProducersFinished);
                    break;
                };
                let text = match serde_json::to_string(&notification) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, kind = %notification.kind, "failed to encode notification");
                        continue;
                    }
                };
                if let Err(end) = write(&mut sink, Frame::Text(text), &teardown, timing.write_wait).await {
                    teardown.trigger(end);
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(end) = write(&mut sink, Frame::Ping, &teardown, timing.write_wait).await {
                    teardown.trigger(end);
                    break;
                }
            }
        }
    }

    sink
}

/// One write under the deadline, abandoned if teardown starts meanwhile.
async fn write<K: FrameSink>(
    sink: &mut K,
    frame: Frame,
    teardown: &Teardown,
    deadline: Duration,
) -> Result<(), SessionEnd> {
    tokio::select! {
        biased;
        () = teardown.cancelled() => Err(SessionEnd::Cancelled),
        result = tokio::time::timeout(deadline, sink.send(frame)) => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(error = %e, "outbound write failed");
                Err(SessionEnd::WriteFailed(e.to_string()))
            }
            Err(_) => {
                warn!(deadline_secs = deadline.as_secs(), "outbound write deadline exceeded");
                Err(SessionEnd::WriteTimeout)
            }
        },
    }
}
