//! The cluster query seam the relay session depends on.

use async_trait::async_trait;
use futures::stream::BoxStream;
use kview_core::{ClusterMetrics, RawWatchEvent, UsageFigures};
use serde_json::Value;

use crate::errors::Result;

/// Live event stream from one watch subscription.
///
/// The stream ends when the upstream connection closes for any reason;
/// read errors are logged by the implementation, not yielded.
pub type WatchStream = BoxStream<'static, RawWatchEvent>;

/// Read-only queries against the cluster.
///
/// A `namespace` of `""` means all namespaces.
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// Raw pod objects currently in scope.
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Value>>;

    /// Usage figures for one pod.
    async fn pod_usage(&self, namespace: &str, name: &str) -> Result<UsageFigures>;

    /// Cluster-wide node, pod and namespace figures.
    async fn cluster_metrics(&self) -> Result<ClusterMetrics>;

    /// Open a watch on pods in scope.
    async fn watch_pods(&self, namespace: &str) -> Result<WatchStream>;

    /// Cheap reachability probe.
    async fn is_healthy(&self) -> bool;
}
