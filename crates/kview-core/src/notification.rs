//! Wire messages exchanged with relay clients.
//!
//! Outbound: `{type, action, namespace?, data, timestamp}`.
//! Inbound: `{type, action, namespace?}` (`type` is carried but unused).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cluster_metrics::ClusterMetrics;
use crate::projection::ChangeAction;
use crate::snapshot::PodSnapshot;

/// Notification kind for pod payloads.
pub const KIND_PODS: &str = "pods";
/// Notification kind for cluster metrics payloads.
pub const KIND_METRICS: &str = "metrics";
/// Notification kind for command failure reports.
pub const KIND_ERROR: &str = "error";

/// Action of the snapshot published when a subscription starts.
pub const ACTION_INITIAL: &str = "initial";
/// Action of a metrics response.
pub const ACTION_UPDATE: &str = "update";

/// One outbound message published on a session's channel.
///
/// `kind` and `action` together determine the shape of `payload`, so a
/// client can route the message without inspecting the payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Payload category (`pods`, `metrics`, `error`).
    #[serde(rename = "type")]
    pub kind: String,
    /// What happened (`initial`, `added`, `modified`, `deleted`, `unknown`, `update`).
    pub action: String,
    /// Namespace scope of the producer, omitted for cluster-wide scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Kind-specific payload.
    #[serde(rename = "data")]
    pub payload: Value,
    /// Set when the notification is built (RFC 3339 on the wire).
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Build a notification stamped with the current time.
    pub fn new(
        kind: impl Into<String>,
        action: impl Into<String>,
        namespace: Option<&str>,
        payload: Value,
    ) -> Self {
        Self {
            kind: kind.into(),
            action: action.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_owned),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Full listing published when a pod subscription (re)starts.
    pub fn pods_initial(namespace: &str, pods: &[PodSnapshot]) -> Self {
        let payload = serde_json::to_value(pods).unwrap_or_else(|_| Value::Array(Vec::new()));
        Self::new(KIND_PODS, ACTION_INITIAL, Some(namespace), payload)
    }

    /// A single live pod change.
    pub fn pod_change(action: ChangeAction, namespace: &str, pod: &PodSnapshot) -> Self {
        let payload = serde_json::to_value(pod).unwrap_or_default();
        Self::new(KIND_PODS, action.as_str(), Some(namespace), payload)
    }

    /// Response to a `get_metrics` command.
    pub fn metrics(metrics: &ClusterMetrics) -> Self {
        let payload = serde_json::to_value(metrics).unwrap_or_default();
        Self::new(KIND_METRICS, ACTION_UPDATE, None, payload)
    }

    /// Failure report for a command, keyed by the command's action.
    pub fn command_error(action: &str, message: &str) -> Self {
        Self::new(
            KIND_ERROR,
            action,
            None,
            serde_json::json!({ "message": message }),
        )
    }
}

/// Inbound client message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Unused by the dispatcher; kept for symmetry with `Notification`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Requested action.
    #[serde(default)]
    pub action: String,
    /// Optional namespace the command applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Command {
    /// Build a command with just an action (tests, clients).
    pub fn with_action(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Classify the action string.
    pub fn parsed_action(&self) -> CommandAction {
        CommandAction::parse(&self.action)
    }
}

/// The fixed set of actions the dispatcher understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandAction {
    /// `subscribe_pods`
    SubscribePods,
    /// `subscribe_nodes`
    SubscribeNodes,
    /// `get_metrics`
    GetMetrics,
    /// Anything else.
    Unknown,
}

impl CommandAction {
    /// Map a wire action string onto the enumerated set.
    pub fn parse(action: &str) -> Self {
        match action {
            "subscribe_pods" => Self::SubscribePods,
            "subscribe_nodes" => Self::SubscribeNodes,
            "get_metrics" => Self::GetMetrics,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod1() -> PodSnapshot {
        PodSnapshot {
            name: "pod1".into(),
            namespace: "default".into(),
            status: "Running".into(),
            node: "node1".into(),
            usage: None,
        }
    }

    #[test]
    fn initial_notification_wire_shape() {
        let n = Notification::pods_initial("default", &[pod1()]);
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["type"], "pods");
        assert_eq!(v["action"], "initial");
        assert_eq!(v["namespace"], "default");
        assert_eq!(
            v["data"],
            json!([{"name": "pod1", "namespace": "default", "status": "Running", "node": "node1"}])
        );
        assert!(v["timestamp"].is_string());
    }

    #[test]
    fn empty_namespace_is_omitted() {
        let n = Notification::pods_initial("", &[]);
        let v = serde_json::to_value(&n).unwrap();
        assert!(v.get("namespace").is_none());
        assert_eq!(v["data"], json!([]));
    }

    #[test]
    fn deleted_change_carries_single_object() {
        let n = Notification::pod_change(ChangeAction::Deleted, "default", &pod1());
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["action"], "deleted");
        assert_eq!(v["data"]["name"], "pod1");
        assert_eq!(v["data"]["node"], "node1");
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let n = Notification::new("pods", "added", None, Value::Null);
        let v = serde_json::to_value(&n).unwrap();
        let ts = v["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn metrics_notification_has_no_namespace() {
        let n = Notification::metrics(&ClusterMetrics::default());
        assert_eq!(n.kind, KIND_METRICS);
        assert_eq!(n.action, ACTION_UPDATE);
        assert!(n.namespace.is_none());
        assert_eq!(n.payload["total_nodes"], 0);
    }

    #[test]
    fn command_error_payload() {
        let n = Notification::command_error("get_metrics", "boom");
        assert_eq!(n.kind, "error");
        assert_eq!(n.action, "get_metrics");
        assert_eq!(n.payload["message"], "boom");
    }

    #[test]
    fn command_parses_full_message() {
        let cmd: Command =
            serde_json::from_str(r#"{"type":"pods","action":"subscribe_pods","namespace":"kube-system"}"#)
                .unwrap();
        assert_eq!(cmd.kind, "pods");
        assert_eq!(cmd.parsed_action(), CommandAction::SubscribePods);
        assert_eq!(cmd.namespace.as_deref(), Some("kube-system"));
    }

    #[test]
    fn command_tolerates_missing_fields() {
        let cmd: Command = serde_json::from_str(r#"{"action":"get_metrics"}"#).unwrap();
        assert_eq!(cmd.kind, "");
        assert_eq!(cmd.parsed_action(), CommandAction::GetMetrics);
        assert!(cmd.namespace.is_none());
    }

    #[test]
    fn unknown_action_classified() {
        assert_eq!(CommandAction::parse("reboot_cluster"), CommandAction::Unknown);
        assert_eq!(CommandAction::parse(""), CommandAction::Unknown);
        assert_eq!(CommandAction::parse("subscribe_nodes"), CommandAction::SubscribeNodes);
    }
}
