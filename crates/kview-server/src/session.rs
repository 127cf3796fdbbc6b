//! Relay session lifecycle: one connected client from upgrade through close.

use std::sync::Arc;
use std::time::Instant;

use kview_cluster::ClusterQuery;
use kview_settings::RelaySettings;
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::dispatcher::CommandDispatcher;
use crate::inbound::run_inbound;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::outbound::{OutboundTiming, run_outbound};
use crate::publisher::Publisher;
use crate::teardown::{SessionEnd, Teardown};
use crate::transport::{FrameSink, FrameSource};
use crate::watch::{WatchOptions, run_watch_loop};

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, transport not yet handed over.
    Connecting,
    /// Loops running.
    Open,
    /// Teardown started; waiting for the loops.
    Closing,
    /// Loops joined and transport closed.
    Closed,
}

/// A single client session.
///
/// [`run`](Self::run) spawns the outbound, inbound and watch loops, waits
/// for the first fatal condition, then joins the loops (aborting any that
/// overrun the teardown timeout) and closes the transport once.
pub struct Session {
    client_id: String,
    cluster: Arc<dyn ClusterQuery>,
    relay: RelaySettings,
    teardown: Teardown,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create a session that also ends when `shutdown` is cancelled.
    pub fn new(
        client_id: impl Into<String>,
        cluster: Arc<dyn ClusterQuery>,
        relay: RelaySettings,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            cluster,
            relay,
            teardown: Teardown::child_of(shutdown),
            state: Mutex::new(SessionState::Connecting),
        }
    }

    /// Client identifier used in logs.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// End the session from outside.
    pub fn cancel(&self) {
        self.teardown.trigger(SessionEnd::Cancelled);
    }

    fn transition(&self, next: SessionState) {
        let prev = std::mem::replace(&mut *self.state.lock(), next);
        debug!(from = ?prev, to = ?next, "session state changed");
    }

    /// Run the session to completion over an already-upgraded transport.
    #[instrument(skip_all, fields(client_id = %self.client_id))]
    pub async fn run<K: FrameSink, R: FrameSource>(&self, sink: K, source: R) -> SessionEnd {
        let started = Instant::now();
        self.transition(SessionState::Open);
        info!("client connected");
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        let (tx, rx) = mpsc::channel(self.relay.outbound_capacity.max(1));
        let publisher = Publisher::new(tx);
        let drops = publisher.drop_counter();

        let mut outbound = tokio::spawn(run_outbound(
            sink,
            rx,
            self.teardown.clone(),
            OutboundTiming {
                ping_interval: self.relay.ping_interval(),
                write_wait: self.relay.write_wait(),
            },
        ));
        let inbound = tokio::spawn(run_inbound(
            source,
            CommandDispatcher::new(
                self.cluster.clone(),
                publisher.clone(),
                self.relay.report_command_errors,
            ),
            self.teardown.clone(),
            self.relay.pong_wait(),
        ));
        let watch = tokio::spawn(run_watch_loop(
            self.cluster.clone(),
            publisher,
            self.teardown.clone(),
            WatchOptions {
                namespace: String::new(),
                backoff: self.relay.watch_backoff(),
                max_reopen_failures: self.relay.max_reopen_failures,
            },
        ));

        self.teardown.cancelled().await;
        self.transition(SessionState::Closing);
        let reason = self.teardown.reason();
        debug!(reason = %reason, "session closing");

        let deadline = tokio::time::Instant::now() + self.relay.teardown_timeout();
        let sink = match tokio::time::timeout_at(deadline, &mut outbound).await {
            Ok(Ok(sink)) => Some(sink),
            Ok(Err(e)) => {
                warn!(error = %e, "outbound loop panicked");
                None
            }
            Err(_) => {
                warn!("outbound loop did not stop in time, aborting");
                outbound.abort();
                None
            }
        };
        join_or_abort("inbound", inbound, deadline).await;
        join_or_abort("watch", watch, deadline).await;

        // An aborted outbound loop drops the sink instead.
        if let Some(mut sink) = sink {
            match tokio::time::timeout(self.relay.write_wait(), sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "transport close failed"),
                Err(_) => debug!("transport close timed out"),
            }
        }
        self.transition(SessionState::Closed);

        let duration = started.elapsed().as_secs_f64();
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(duration);
        info!(
            reason = %reason,
            duration_secs = duration,
            dropped = drops.get(),
            "client disconnected"
        );
        reason
    }
}

async fn join_or_abort(name: &str, mut task: JoinHandle<()>, deadline: tokio::time::Instant) {
    match tokio::time::timeout_at(deadline, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(task = name, error = %e, "session task panicked"),
        Err(_) => {
            warn!(task = name, "session task did not stop in time, aborting");
            task.abort();
        }
    }
}
