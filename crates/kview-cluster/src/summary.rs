//! Cluster-wide metrics aggregation over node, pod and namespace lists.

use std::collections::{BTreeMap, HashMap};

use kview_core::{ClusterMetrics, NamespaceMetrics, NodeMetrics};
use serde::Deserialize;

use crate::quantity::{self, Quantity, QuantityFormat};

/// Generic `*List` response body.
#[derive(Debug, Deserialize)]
pub struct ObjectList<T> {
    /// List items.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// The parts of a node the summary reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NodeView {
    metadata: ObjectMeta,
    status: NodeStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ObjectMeta {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeStatus {
    capacity: BTreeMap<String, String>,
    allocatable: BTreeMap<String, String>,
    conditions: Vec<NodeCondition>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

/// The parts of a pod the summary reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PodPlacement {
    metadata: ObjectMeta,
    spec: PlacementSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlacementSpec {
    node_name: String,
}

/// The parts of a namespace the summary reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NamespaceView {
    metadata: ObjectMeta,
}

impl NodeView {
    fn readiness(&self) -> &'static str {
        self.status
            .conditions
            .iter()
            .find(|c| c.kind == "Ready")
            .map_or("Unknown", |c| if c.status == "True" { "Ready" } else { "NotReady" })
    }

    fn quantity(map: &BTreeMap<String, String>, key: &str) -> String {
        quantity::canonical(map.get(key).map(String::as_str))
    }
}

/// Aggregate node, pod and namespace listings into [`ClusterMetrics`].
pub fn summarize(
    nodes: &[NodeView],
    pods: &[PodPlacement],
    namespaces: &[NamespaceView],
) -> ClusterMetrics {
    let mut per_node: HashMap<&str, usize> = HashMap::new();
    let mut per_namespace: HashMap<&str, usize> = HashMap::new();
    for pod in pods {
        *per_node.entry(pod.spec.node_name.as_str()).or_default() += 1;
        *per_namespace.entry(pod.metadata.namespace.as_str()).or_default() += 1;
    }

    let cpu_capacity = quantity::sum(
        nodes
            .iter()
            .filter_map(|n| n.status.capacity.get("cpu").map(String::as_str)),
        Quantity::zero(QuantityFormat::Decimal),
    );
    let memory_capacity = quantity::sum(
        nodes
            .iter()
            .filter_map(|n| n.status.capacity.get("memory").map(String::as_str)),
        Quantity::zero(QuantityFormat::Binary),
    );

    let node_metrics = nodes
        .iter()
        .map(|node| NodeMetrics {
            name: node.metadata.name.clone(),
            cpu_capacity: NodeView::quantity(&node.status.capacity, "cpu"),
            memory_capacity: NodeView::quantity(&node.status.capacity, "memory"),
            cpu_allocatable: NodeView::quantity(&node.status.allocatable, "cpu"),
            memory_allocatable: NodeView::quantity(&node.status.allocatable, "memory"),
            pod_capacity: NodeView::quantity(&node.status.capacity, "pods"),
            pod_count: per_node
                .get(node.metadata.name.as_str())
                .copied()
                .unwrap_or(0),
            status: node.readiness().to_string(),
            labels: node.metadata.labels.clone(),
        })
        .collect();

    let namespace_metrics = namespaces
        .iter()
        .map(|ns| NamespaceMetrics {
            name: ns.metadata.name.clone(),
            pod_count: per_namespace
                .get(ns.metadata.name.as_str())
                .copied()
                .unwrap_or(0),
        })
        .collect();

    ClusterMetrics {
        total_nodes: nodes.len(),
        total_pods: pods.len(),
        total_namespaces: namespaces.len(),
        cpu_capacity: cpu_capacity.to_string(),
        memory_capacity: memory_capacity.to_string(),
        node_metrics,
        namespace_metrics,
    }
}
