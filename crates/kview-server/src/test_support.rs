//! In-memory transport and cluster fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use kview_cluster::{ClusterError, ClusterQuery, WatchStream};
use kview_core::{ClusterMetrics, RawWatchEvent, UsageFigures};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::transport::{Frame, FrameSink, FrameSource, TransportError};

// ── Transport ───────────────────────────────────────────────────────────────

/// How the fake sink behaves on `send`.
#[derive(Clone, Copy, Debug)]
pub(crate) enum SinkMode {
    Healthy,
    /// Succeed this many times, then fail every write.
    FailAfter(usize),
    /// Never complete a write.
    Stall,
}

pub(crate) struct FakeSink {
    sent: mpsc::UnboundedSender<Frame>,
    closes: Arc<AtomicUsize>,
    mode: SinkMode,
    writes: usize,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        match self.mode {
            SinkMode::Stall => std::future::pending().await,
            SinkMode::FailAfter(n) if self.writes >= n => {
                Err(TransportError::Send("broken pipe".into()))
            }
            _ => {
                self.writes += 1;
                self.sent.send(frame).map_err(|_| TransportError::Send("peer gone".into()))
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeSource {
    rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await
    }
}

/// The remote end of a fake connection.
pub(crate) struct Peer {
    inbound: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    closes: Arc<AtomicUsize>,
}

pub(crate) fn pipe(mode: SinkMode) -> (FakeSink, FakeSource, Peer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let closes = Arc::new(AtomicUsize::new(0));
    (
        FakeSink {
            sent: out_tx,
            closes: closes.clone(),
            mode,
            writes: 0,
        },
        FakeSource { rx: in_rx },
        Peer {
            inbound: Some(in_tx),
            outbound: out_rx,
            closes,
        },
    )
}

impl Peer {
    pub(crate) fn send(&self, frame: Frame) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(frame));
        }
    }

    pub(crate) fn send_command(&self, action: &str) {
        self.send(Frame::Text(json!({"type": "", "action": action}).to_string()));
    }

    pub(crate) fn fail_read(&self) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(TransportError::Receive("connection reset".into())));
        }
    }

    /// Drop the inbound sender so the source reports EOF.
    pub(crate) fn hang_up(&mut self) {
        self.inbound = None;
    }

    pub(crate) async fn next_frame(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Next text frame decoded as JSON, skipping keepalive pings.
    pub(crate) async fn next_notification(&mut self) -> Option<Value> {
        loop {
            match self.outbound.recv().await? {
                Frame::Text(text) => return serde_json::from_str(&text).ok(),
                Frame::Ping => {}
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }

    pub(crate) fn try_next_frame(&mut self) -> Option<Frame> {
        self.outbound.try_recv().ok()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

// ── Cluster ─────────────────────────────────────────────────────────────────

/// One scripted answer to `watch_pods`.
pub(crate) enum WatchScript {
    /// Opening fails.
    Fail,
    /// Yields the events, then the stream closes.
    Events(Vec<RawWatchEvent>),
    /// Yields whatever is sent; closes when the sender drops.
    Live(mpsc::UnboundedReceiver<RawWatchEvent>),
    /// Never yields and never closes.
    Pending,
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    pub pods: Mutex<Vec<Value>>,
    pub list_fails: bool,
    pub usage: Option<UsageFigures>,
    pub usage_delay: Option<Duration>,
    pub metrics: Option<ClusterMetrics>,
    pub healthy: bool,
    pub watches: Mutex<VecDeque<WatchScript>>,
    pub watch_scopes: Mutex<Vec<String>>,
    pub list_calls: AtomicUsize,
    pub usage_calls: AtomicUsize,
}

impl FakeCluster {
    pub(crate) fn with_watches(mut self, scripts: Vec<WatchScript>) -> Self {
        self.watches = Mutex::new(scripts.into());
        self
    }

    pub(crate) fn watch_opens(&self) -> usize {
        self.watch_scopes.lock().len()
    }
}

fn unavailable(what: &str) -> ClusterError {
    ClusterError::Status {
        code: 503,
        message: format!("{what} unavailable"),
    }
}

#[async_trait]
impl ClusterQuery for FakeCluster {
    async fn list_pods(&self, _namespace: &str) -> kview_cluster::Result<Vec<Value>> {
        let _ = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.list_fails {
            return Err(unavailable("list"));
        }
        Ok(self.pods.lock().clone())
    }

    async fn pod_usage(&self, _namespace: &str, _name: &str) -> kview_cluster::Result<UsageFigures> {
        let _ = self.usage_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.usage_delay {
            tokio::time::sleep(delay).await;
        }
        self.usage.clone().ok_or_else(|| unavailable("usage"))
    }

    async fn cluster_metrics(&self) -> kview_cluster::Result<ClusterMetrics> {
        self.metrics.clone().ok_or_else(|| unavailable("metrics"))
    }

    async fn watch_pods(&self, namespace: &str) -> kview_cluster::Result<WatchStream> {
        self.watch_scopes.lock().push(namespace.to_string());
        let script = self.watches.lock().pop_front();
        match script {
            None | Some(WatchScript::Fail) => Err(unavailable("watch")),
            Some(WatchScript::Events(events)) => Ok(futures::stream::iter(events).boxed()),
            Some(WatchScript::Live(rx)) => Ok(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed()),
            Some(WatchScript::Pending) => Ok(futures::stream::pending().boxed()),
        }
    }

    async fn is_healthy(&self) -> bool {
        self.healthy
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────────

pub(crate) fn pod_object(name: &str, namespace: &str, phase: &str, node: Option<&str>) -> Value {
    let mut spec = json!({"containers": [{"name": "app"}]});
    if let Some(node) = node {
        spec["nodeName"] = json!(node);
    }
    json!({
        "metadata": {"name": name, "namespace": namespace},
        "spec": spec,
        "status": {"phase": phase}
    })
}

pub(crate) fn event(event_type: &str, object: Value) -> RawWatchEvent {
    RawWatchEvent {
        event_type: event_type.to_string(),
        object,
    }
}
