//! Upstream watch loop: relays pod changes from the cluster to one session.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kview_cluster::{ClusterQuery, WatchStream};
use kview_core::{Notification, PodSnapshot, project_event, project_object};
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use crate::metrics::RELAY_WATCH_RESTARTS_TOTAL;
use crate::publisher::{PublishOutcome, Publisher};
use crate::teardown::{SessionEnd, Teardown};

/// Scope and retry policy for one watch loop.
#[derive(Clone, Debug)]
pub struct WatchOptions {
    /// Namespace to watch; empty watches every namespace.
    pub namespace: String,
    /// Pause before re-opening a closed or failed subscription.
    pub backoff: Duration,
    /// Consecutive re-open failures tolerated before the session is torn down.
    pub max_reopen_failures: u32,
}

/// Watch pods and publish an initial listing followed by live changes.
///
/// Every (re)opened subscription republishes the initial listing. A
/// failure to open the first subscription ends only this loop. Too many
/// consecutive re-open failures end the session with
/// [`SessionEnd::UpstreamUnavailable`].
#[instrument(skip_all, fields(namespace = %options.namespace))]
pub async fn run_watch_loop(
    cluster: Arc<dyn ClusterQuery>,
    publisher: Publisher,
    teardown: Teardown,
    options: WatchOptions,
) {
    let relay = Relay {
        cluster: cluster.as_ref(),
        publisher: &publisher,
        teardown: &teardown,
        scope: &options.namespace,
    };

    let mut stream = match relay.open().await {
        None => return,
        Some(Ok(stream)) => stream,
        Some(Err(e)) => {
            warn!(
                error = %e,
                status = ?e.status_code(),
                "failed to open pod watch, continuing without live updates"
            );
            return;
        }
    };

    loop {
        if relay.publish_initial().await.is_break() || relay.pump(&mut stream).await.is_break() {
            return;
        }
        drop(stream);

        counter!(RELAY_WATCH_RESTARTS_TOTAL).increment(1);
        info!(backoff_ms = options.backoff.as_millis() as u64, "pod watch closed, reopening");

        let mut failures = 0u32;
        stream = loop {
            if relay.sleep(options.backoff).await.is_break() {
                return;
            }
            match relay.open().await {
                None => return,
                Some(Ok(stream)) => break stream,
                Some(Err(e)) => {
                    failures += 1;
                    warn!(error = %e, status = ?e.status_code(), failures, "failed to reopen pod watch");
                    if failures >= options.max_reopen_failures {
                        warn!(failures, "pod watch unavailable, closing session");
                        teardown.trigger(SessionEnd::UpstreamUnavailable);
                        return;
                    }
                }
            }
        };
    }
}

/// Borrowed context for one loop. `Break` means stop: cancelled or no consumer.
struct Relay<'a> {
    cluster: &'a dyn ClusterQuery,
    publisher: &'a Publisher,
    teardown: &'a Teardown,
    scope: &'a str,
}

impl Relay<'_> {
    /// `None` when cancelled first.
    async fn open(&self) -> Option<kview_cluster::Result<WatchStream>> {
        tokio::select! {
            biased;
            () = self.teardown.cancelled() => None,
            result = self.cluster.watch_pods(self.scope) => Some(result),
        }
    }

    async fn sleep(&self, duration: Duration) -> ControlFlow<()> {
        tokio::select! {
            biased;
            () = self.teardown.cancelled() => ControlFlow::Break(()),
            () = tokio::time::sleep(duration) => ControlFlow::Continue(()),
        }
    }

    /// List the scope and publish it as one `initial` notification.
    /// A failed list is logged and skipped.
    async fn publish_initial(&self) -> ControlFlow<()> {
        let listed = tokio::select! {
            biased;
            () = self.teardown.cancelled() => return ControlFlow::Break(()),
            result = self.cluster.list_pods(self.scope) => result,
        };
        let objects = match listed {
            Ok(objects) => objects,
            Err(e) => {
                warn!(error = %e, "failed to list pods for initial snapshot");
                return ControlFlow::Continue(());
            }
        };

        let mut pods = Vec::with_capacity(objects.len());
        for object in &objects {
            match project_object(object) {
                Ok(pod) => match self.enrich(pod).await {
                    Some(pod) => pods.push(pod),
                    None => return ControlFlow::Break(()),
                },
                Err(e) => debug!(error = %e, "skipping unprojectable pod in listing"),
            }
        }

        debug!(count = pods.len(), "publishing initial pod listing");
        self.publish(Notification::pods_initial(self.scope, &pods))
    }

    /// Relay events until the stream closes (`Continue`) or the loop must stop.
    async fn pump(&self, stream: &mut WatchStream) -> ControlFlow<()> {
        loop {
            let next = tokio::select! {
                biased;
                () = self.teardown.cancelled() => return ControlFlow::Break(()),
                next = stream.next() => next,
            };
            let Some(event) = next else {
                return ControlFlow::Continue(());
            };

            let (action, pod) = match project_event(&event) {
                Ok(projected) => projected,
                Err(e) => {
                    warn!(event_type = %event.event_type, error = %e, "dropping malformed watch event");
                    continue;
                }
            };
            let Some(pod) = self.enrich(pod).await else {
                return ControlFlow::Break(());
            };
            if self.publish(Notification::pod_change(action, self.scope, &pod)).is_break() {
                return ControlFlow::Break(());
            }
        }
    }

    /// Attach usage figures; a failed lookup leaves the pod as is.
    /// `None` when cancelled.
    async fn enrich(&self, pod: PodSnapshot) -> Option<PodSnapshot> {
        let usage = tokio::select! {
            biased;
            () = self.teardown.cancelled() => return None,
            result = self.cluster.pod_usage(&pod.namespace, &pod.name) => result,
        };
        match usage {
            Ok(usage) => Some(pod.with_usage(usage)),
            Err(e) => {
                debug!(pod = %pod.name, error = %e, "usage lookup failed");
                Some(pod)
            }
        }
    }

    fn publish(&self, notification: Notification) -> ControlFlow<()> {
        match self.publisher.publish(notification) {
            PublishOutcome::Closed => {
                debug!("outbound channel closed, stopping watch");
                ControlFlow::Break(())
            }
            PublishOutcome::Sent | PublishOutcome::Dropped => ControlFlow::Continue(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeCluster, WatchScript, event, pod_object};
    use kview_core::UsageFigures;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn options() -> WatchOptions {
        WatchOptions {
            namespace: String::new(),
            backoff: Duration::from_secs(1),
            max_reopen_failures: 3,
        }
    }

    fn start(
        cluster: Arc<FakeCluster>,
    ) -> (
        tokio::task::JoinHandle<()>,
        mpsc::Receiver<Notification>,
        Teardown,
    ) {
        let (tx, rx) = mpsc::channel(64);
        let teardown = Teardown::child_of(&CancellationToken::new());
        let handle = tokio::spawn(run_watch_loop(
            cluster,
            Publisher::new(tx),
            teardown.clone(),
            options(),
        ));
        (handle, rx, teardown)
    }

    #[tokio::test(start_paused = true)]
    async fn initial_listing_precedes_live_events() {
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        let cluster = FakeCluster {
            pods: parking_lot::Mutex::new(vec![
                pod_object("a", "default", "Running", Some("node-1")),
                pod_object("b", "default", "Pending", None),
            ]),
            ..FakeCluster::default()
        }
        .with_watches(vec![WatchScript::Live(live_rx)]);
        let cluster = Arc::new(cluster);
        let (_handle, mut rx, teardown) = start(cluster.clone());

        let initial = rx.recv().await.unwrap();
        assert_eq!(initial.kind, "pods");
        assert_eq!(initial.action, "initial");
        assert_eq!(initial.namespace, None);
        assert_eq!(initial.payload.as_array().unwrap().len(), 2);
        assert_eq!(initial.payload[1]["node"], "");

        live_tx
            .send(event("MODIFIED", pod_object("a", "default", "Succeeded", Some("node-1"))))
            .unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.action, "modified");
        assert_eq!(change.payload["status"], "Succeeded");
        // One usage lookup per listed pod, then one per event.
        assert_eq!(cluster.usage_calls.load(Ordering::SeqCst), 3);

        teardown.trigger(SessionEnd::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_pod_after_initial() {
        let cluster = FakeCluster {
            pods: parking_lot::Mutex::new(vec![pod_object("pod1", "default", "Running", None)]),
            ..FakeCluster::default()
        }
        .with_watches(vec![
            WatchScript::Events(vec![event(
                "DELETED",
                pod_object("pod1", "default", "Running", None),
            )]),
            WatchScript::Pending,
        ]);
        let (_handle, mut rx, teardown) = start(Arc::new(cluster));

        let initial = rx.recv().await.unwrap();
        assert_eq!(initial.action, "initial");
        assert_eq!(initial.payload[0]["name"], "pod1");

        let deleted = rx.recv().await.unwrap();
        assert_eq!(deleted.action, "deleted");
        assert_eq!(deleted.payload["name"], "pod1");
        assert_eq!(deleted.payload["namespace"], "default");

        teardown.trigger(SessionEnd::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn usage_figures_are_attached() {
        let cluster = FakeCluster {
            pods: parking_lot::Mutex::new(vec![pod_object("a", "default", "Running", None)]),
            usage: Some(UsageFigures {
                cpu_request: "250m".into(),
                container_count: 1,
                ..UsageFigures::default()
            }),
            ..FakeCluster::default()
        }
        .with_watches(vec![WatchScript::Pending]);
        let (_handle, mut rx, teardown) = start(Arc::new(cluster));

        let initial = rx.recv().await.unwrap();
        assert_eq!(initial.payload[0]["cpu_request"], "250m");
        assert_eq!(initial.payload[0]["container_count"], 1);
        teardown.trigger(SessionEnd::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream_reopens_with_same_scope() {
        let cluster = Arc::new(
            FakeCluster {
                pods: parking_lot::Mutex::new(vec![pod_object("a", "default", "Running", None)]),
                ..FakeCluster::default()
            }
            .with_watches(vec![WatchScript::Events(Vec::new()), WatchScript::Pending]),
        );
        let (_handle, mut rx, teardown) = start(cluster.clone());

        assert_eq!(rx.recv().await.unwrap().action, "initial");
        assert_eq!(rx.recv().await.unwrap().action, "initial");
        assert_eq!(cluster.watch_opens(), 2);
        assert!(cluster.watch_scopes.lock().iter().all(String::is_empty));
        assert_eq!(cluster.list_calls.load(Ordering::SeqCst), 2);
        assert!(!teardown.is_triggered());
        teardown.trigger(SessionEnd::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn first_open_failure_exits_without_teardown() {
        let cluster = Arc::new(FakeCluster::default().with_watches(vec![WatchScript::Fail]));
        let (handle, mut rx, teardown) = start(cluster.clone());

        handle.await.unwrap();
        assert_eq!(cluster.watch_opens(), 1);
        assert!(!teardown.is_triggered());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_failures_trip_breaker() {
        let cluster = Arc::new(FakeCluster::default().with_watches(vec![
            WatchScript::Events(Vec::new()),
            WatchScript::Fail,
            WatchScript::Fail,
            WatchScript::Fail,
        ]));
        let (handle, _rx, teardown) = start(cluster.clone());

        handle.await.unwrap();
        assert_eq!(cluster.watch_opens(), 4);
        assert_eq!(teardown.reason(), SessionEnd::UpstreamUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_reopen_resets_failures() {
        let cluster = Arc::new(FakeCluster::default().with_watches(vec![
            WatchScript::Events(Vec::new()),
            WatchScript::Fail,
            WatchScript::Fail,
            WatchScript::Events(Vec::new()),
            WatchScript::Fail,
            WatchScript::Fail,
            WatchScript::Pending,
        ]));
        let (_handle, _rx, teardown) = start(cluster.clone());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cluster.watch_opens(), 7);
        assert!(!teardown.is_triggered());
        teardown.trigger(SessionEnd::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn list_failure_still_relays_live_events() {
        let cluster = FakeCluster {
            list_fails: true,
            ..FakeCluster::default()
        }
        .with_watches(vec![
            WatchScript::Events(vec![event("ADDED", pod_object("a", "default", "Pending", None))]),
            WatchScript::Pending,
        ]);
        let (_handle, mut rx, teardown) = start(Arc::new(cluster));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.action, "added");
        teardown.trigger(SessionEnd::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_events_are_dropped() {
        let cluster = FakeCluster::default().with_watches(vec![
            WatchScript::Events(vec![
                event("ADDED", serde_json::json!({"metadata": {"name": "x"}})),
                event("BOOKMARK", pod_object("b", "default", "Running", None)),
            ]),
            WatchScript::Pending,
        ]);
        let cluster = Arc::new(cluster);
        let (_handle, mut rx, teardown) = start(cluster.clone());

        assert_eq!(rx.recv().await.unwrap().action, "initial");
        let next = rx.recv().await.unwrap();
        assert_eq!(next.action, "unknown");
        assert_eq!(next.payload["name"], "b");
        assert_eq!(cluster.usage_calls.load(Ordering::SeqCst), 1);
        teardown.trigger(SessionEnd::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_enrichment_publishes_nothing() {
        let cluster = FakeCluster {
            pods: parking_lot::Mutex::new(vec![pod_object("a", "default", "Running", None)]),
            usage_delay: Some(Duration::from_secs(60)),
            ..FakeCluster::default()
        }
        .with_watches(vec![WatchScript::Pending]);
        let (handle, mut rx, teardown) = start(Arc::new(cluster));

        tokio::time::sleep(Duration::from_secs(1)).await;
        teardown.trigger(SessionEnd::PeerClosed);
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn consumer_gone_stops_loop() {
        let cluster = FakeCluster::default().with_watches(vec![WatchScript::Pending]);
        let (handle, rx, teardown) = start(Arc::new(cluster));
        drop(rx);

        handle.await.unwrap();
        assert!(!teardown.is_triggered());
    }
}
