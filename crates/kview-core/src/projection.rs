//! Typed projection of raw pod objects into [`PodSnapshot`]s.
//!
//! The raw object is deserialized straight into a narrow typed view. A
//! missing or mistyped required field is a [`ProjectionError`]; callers log
//! and drop the event. Nothing in here can panic on malformed input.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::snapshot::PodSnapshot;

/// One event from an upstream watch stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawWatchEvent {
    /// `ADDED`, `MODIFIED`, `DELETED`, `BOOKMARK`, `ERROR`, ...
    #[serde(rename = "type")]
    pub event_type: String,
    /// The changed object as sent by the API server.
    #[serde(default)]
    pub object: Value,
}

/// Classified change kind, as sent in a notification's `action`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// Object appeared.
    Added,
    /// Object changed.
    Modified,
    /// Object removed.
    Deleted,
    /// Any other upstream event type.
    Unknown,
}

impl ChangeAction {
    /// Classify an upstream event type string.
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            "ADDED" => Self::Added,
            "MODIFIED" => Self::Modified,
            "DELETED" => Self::Deleted,
            _ => Self::Unknown,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Unknown => "unknown",
        }
    }
}

/// Why a raw object could not be projected.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The object is not a JSON object at all.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    /// A required field is missing or has the wrong type.
    #[error("malformed pod object: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct PodView {
    metadata: MetadataView,
    spec: SpecView,
    status: StatusView,
}

#[derive(Deserialize)]
struct MetadataView {
    name: String,
    namespace: String,
}

#[derive(Deserialize)]
struct SpecView {
    // Omitted by the API server until the pod is scheduled.
    #[serde(rename = "nodeName", default)]
    node_name: String,
}

#[derive(Deserialize)]
struct StatusView {
    phase: String,
}

/// Project a raw pod object into a snapshot without usage figures.
pub fn project_object(object: &Value) -> Result<PodSnapshot, ProjectionError> {
    if !object.is_object() {
        return Err(ProjectionError::NotAnObject(json_type_name(object)));
    }
    let view = PodView::deserialize(object)?;
    Ok(PodSnapshot {
        name: view.metadata.name,
        namespace: view.metadata.namespace,
        status: view.status.phase,
        node: view.spec.node_name,
        usage: None,
    })
}

/// Classify and project a watch event.
pub fn project_event(event: &RawWatchEvent) -> Result<(ChangeAction, PodSnapshot), ProjectionError> {
    let action = ChangeAction::classify(&event.event_type);
    let pod = project_object(&event.object)?;
    Ok((action, pod))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
