//! Inbound loop: the only reader on a session's transport.

use std::time::Duration;

use kview_core::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dispatcher::CommandDispatcher;
use crate::teardown::{SessionEnd, Teardown};
use crate::transport::{Frame, FrameSource};

/// Read frames until the peer goes away, the read deadline passes, or
/// teardown starts.
///
/// The deadline starts at `pong_wait` and is pushed out by every pong.
/// Commands are handled one at a time, in arrival order.
pub async fn run_inbound<R: FrameSource>(
    mut source: R,
    dispatcher: CommandDispatcher,
    teardown: Teardown,
    pong_wait: Duration,
) {
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let next = tokio::select! {
            biased;
            () = teardown.cancelled() => return,
            next = tokio::time::timeout_at(deadline, source.recv()) => next,
        };

        let frame = match next {
            Err(_) => {
                warn!(pong_wait_secs = pong_wait.as_secs(), "read deadline exceeded");
                teardown.trigger(SessionEnd::ReadTimeout);
                return;
            }
            Ok(None | Some(Ok(Frame::Close))) => {
                debug!("peer closed connection");
                teardown.trigger(SessionEnd::PeerClosed);
                return;
            }
            Ok(Some(Err(e))) => {
                debug!(error = %e, "read failed");
                teardown.trigger(SessionEnd::ReadFailed(e.to_string()));
                return;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Frame::Pong => deadline = Instant::now() + pong_wait,
            Frame::Text(text) => match serde_json::from_str::<Command>(&text) {
                Ok(command) => dispatcher.dispatch(&command, &teardown).await,
                Err(e) => warn!(error = %e, "discarding malformed command"),
            },
            Frame::Ping | Frame::Close => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::publisher::Publisher;
    use crate::test_support::{FakeCluster, SinkMode, pipe};
    use kview_core::{ClusterMetrics, Notification};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const PONG_WAIT: Duration = Duration::from_secs(60);

    fn dispatcher(cluster: FakeCluster) -> (CommandDispatcher, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(8);
        (CommandDispatcher::new(Arc::new(cluster), Publisher::new(tx), false), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn close_frame_ends_with_peer_closed() {
        let (_sink, source, peer) = pipe(SinkMode::Healthy);
        let (dispatcher, _rx) = dispatcher(FakeCluster::default());
        let teardown = Teardown::child_of(&CancellationToken::new());

        peer.send(Frame::Close);
        run_inbound(source, dispatcher, teardown.clone(), PONG_WAIT).await;

        assert_eq!(teardown.reason(), SessionEnd::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn eof_ends_with_peer_closed() {
        let (_sink, source, mut peer) = pipe(SinkMode::Healthy);
        let (dispatcher, _rx) = dispatcher(FakeCluster::default());
        let teardown = Teardown::child_of(&CancellationToken::new());

        peer.hang_up();
        run_inbound(source, dispatcher, teardown.clone(), PONG_WAIT).await;

        assert_eq!(teardown.reason(), SessionEnd::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn read_error_triggers_teardown() {
        let (_sink, source, peer) = pipe(SinkMode::Healthy);
        let (dispatcher, _rx) = dispatcher(FakeCluster::default());
        let teardown = Teardown::child_of(&CancellationToken::new());

        peer.fail_read();
        run_inbound(source, dispatcher, teardown.clone(), PONG_WAIT).await;

        assert_matches!(teardown.reason(), SessionEnd::ReadFailed(_));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_hits_read_deadline() {
        let (_sink, source, _peer) = pipe(SinkMode::Healthy);
        let (dispatcher, _rx) = dispatcher(FakeCluster::default());
        let teardown = Teardown::child_of(&CancellationToken::new());

        let started = Instant::now();
        run_inbound(source, dispatcher, teardown.clone(), PONG_WAIT).await;

        assert_eq!(teardown.reason(), SessionEnd::ReadTimeout);
        assert!(started.elapsed() >= PONG_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn pong_extends_deadline() {
        let (_sink, source, peer) = pipe(SinkMode::Healthy);
        let (dispatcher, _rx) = dispatcher(FakeCluster::default());
        let teardown = Teardown::child_of(&CancellationToken::new());
        let handle = tokio::spawn(run_inbound(source, dispatcher, teardown.clone(), PONG_WAIT));

        tokio::time::sleep(Duration::from_secs(50)).await;
        peer.send(Frame::Pong);
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert!(!teardown.is_triggered());

        // Pings and text do not refresh the deadline.
        peer.send(Frame::Ping);
        peer.send_command("subscribe_pods");
        handle.await.unwrap();
        assert_eq!(teardown.reason(), SessionEnd::ReadTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_command_is_skipped() {
        let cluster = FakeCluster {
            metrics: Some(ClusterMetrics::default()),
            ..FakeCluster::default()
        };
        let (_sink, source, peer) = pipe(SinkMode::Healthy);
        let (dispatcher, mut rx) = dispatcher(cluster);
        let teardown = Teardown::child_of(&CancellationToken::new());

        peer.send(Frame::Text("{not json".into()));
        peer.send_command("get_metrics");
        peer.send(Frame::Close);
        run_inbound(source, dispatcher, teardown.clone(), PONG_WAIT).await;

        assert_eq!(rx.try_recv().unwrap().kind, "metrics");
        assert_eq!(teardown.reason(), SessionEnd::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_handled_in_order() {
        let cluster = FakeCluster {
            metrics: Some(ClusterMetrics::default()),
            ..FakeCluster::default()
        };
        let (_sink, source, peer) = pipe(SinkMode::Healthy);
        let (dispatcher, mut rx) = dispatcher(cluster);
        let teardown = Teardown::child_of(&CancellationToken::new());

        peer.send_command("get_metrics");
        peer.send_command("bogus");
        peer.send_command("get_metrics");
        peer.send(Frame::Close);
        run_inbound(source, dispatcher, teardown, PONG_WAIT).await;

        assert_eq!(rx.try_recv().unwrap().kind, "metrics");
        assert_eq!(rx.try_recv().unwrap().kind, "metrics");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_reading() {
        let (_sink, source, _peer) = pipe(SinkMode::Healthy);
        let (dispatcher, _rx) = dispatcher(FakeCluster::default());
        let teardown = Teardown::child_of(&CancellationToken::new());
        teardown.trigger(SessionEnd::WriteTimeout);

        run_inbound(source, dispatcher, teardown.clone(), PONG_WAIT).await;
        assert_eq!(teardown.reason(), SessionEnd::WriteTimeout);
    }
}
