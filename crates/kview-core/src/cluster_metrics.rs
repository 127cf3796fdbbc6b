//! Cluster-wide metrics returned for the `get_metrics` command.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aggregate cluster metrics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    /// Number of nodes.
    pub total_nodes: usize,
    /// Number of pods across all namespaces.
    pub total_pods: usize,
    /// Number of namespaces.
    pub total_namespaces: usize,
    /// Summed node CPU capacity.
    pub cpu_capacity: String,
    /// Summed node memory capacity.
    pub memory_capacity: String,
    /// Per-node breakdown.
    pub node_metrics: Vec<NodeMetrics>,
    /// Per-namespace pod counts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace_metrics: Vec<NamespaceMetrics>,
}

/// Metrics for a single node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Node name.
    pub name: String,
    /// CPU capacity.
    pub cpu_capacity: String,
    /// Memory capacity.
    pub memory_capacity: String,
    /// Allocatable CPU.
    pub cpu_allocatable: String,
    /// Allocatable memory.
    pub memory_allocatable: String,
    /// Pod capacity.
    pub pod_capacity: String,
    /// Pods scheduled onto this node.
    pub pod_count: usize,
    /// `Ready`, `NotReady` or `Unknown`.
    pub status: String,
    /// Node labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Pod count for a namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMetrics {
    /// Namespace name.
    pub name: String,
    /// Pods in the namespace.
    pub pod_count: usize,
}
