//! Per-pod usage figures derived from a pod object.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kview_core::UsageFigures;
use serde::Deserialize;
use serde_json::Value;

use crate::quantity::{self, Quantity};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PodResources {
    metadata: Metadata,
    spec: Spec,
    status: Status,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Metadata {
    creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Spec {
    containers: Vec<Container>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Container {
    resources: Resources,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Resources {
    requests: BTreeMap<String, String>,
    limits: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Status {
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ContainerStatus {
    restart_count: i64,
}

/// Compute usage figures for a pod object as of `now`.
///
/// Requests and limits are summed across containers; zero sums render as
/// empty strings so they are omitted on the wire.
pub fn pod_usage(object: &Value, now: DateTime<Utc>) -> serde_json::Result<UsageFigures> {
    let pod = PodResources::deserialize(object)?;

    Ok(UsageFigures {
        cpu_request: total(&pod.spec.containers, |r| &r.requests, "cpu"),
        cpu_limit: total(&pod.spec.containers, |r| &r.limits, "cpu"),
        memory_request: total(&pod.spec.containers, |r| &r.requests, "memory"),
        memory_limit: total(&pod.spec.containers, |r| &r.limits, "memory"),
        age: pod
            .metadata
            .creation_timestamp
            .map(|created| format_age((now - created).num_seconds()))
            .unwrap_or_default(),
        container_count: pod.spec.containers.len(),
        restart_count: pod
            .status
            .container_statuses
            .iter()
            .map(|s| s.restart_count)
            .sum(),
    })
}

fn total(
    containers: &[Container],
    pick: fn(&Resources) -> &BTreeMap<String, String>,
    key: &str,
) -> String {
    let sum = quantity::sum(
        containers
            .iter()
            .filter_map(|c| pick(&c.resources).get(key).map(String::as_str)),
        Quantity::default(),
    );
    if sum.is_zero() { String::new() } else { sum.to_string() }
}

/// Render an age in seconds as `Ns`, `Nm`, `Nh` or `Nd` (truncating).
pub fn format_age(seconds: i64) -> String {
    match seconds {
        s if s < 0 => "0s".to_string(),
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}
