//! Compact pod representation sent to relay clients.

use serde::{Deserialize, Serialize};

/// Simplified view of one pod instance.
///
/// Built from either a list response or a single change event and never
/// mutated afterwards, except for attaching usage figures before publish.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PodSnapshot {
    /// Pod name.
    pub name: String,
    /// Pod namespace.
    pub namespace: String,
    /// Pod phase (`Pending`, `Running`, ...).
    pub status: String,
    /// Assigned node; empty while unscheduled.
    pub node: String,
    /// Resource figures, present only when enrichment succeeded.
    #[serde(flatten)]
    pub usage: Option<UsageFigures>,
}

impl PodSnapshot {
    /// Attach usage figures, replacing any previous ones.
    #[must_use]
    pub fn with_usage(mut self, usage: UsageFigures) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Per-pod resource figures derived from container specs and statuses.
///
/// String fields are omitted from the wire when empty (zero quantities are
/// rendered as empty). Counts are always present once enrichment succeeded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageFigures {
    /// Sum of container CPU requests.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu_request: String,
    /// Sum of container CPU limits.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu_limit: String,
    /// Sum of container memory requests.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory_request: String,
    /// Sum of container memory limits.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory_limit: String,
    /// Human-readable age (`45s`, `3m`, `2h`, `7d`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub age: String,
    /// Number of containers in the pod spec.
    #[serde(default)]
    pub container_count: usize,
    /// Total restarts across container statuses.
    #[serde(default)]
    pub restart_count: i64,
}
