//! # kview-core
//!
//! Shared types for the kview live relay:
//!
//! - [`notification`]: outbound `Notification` and inbound `Command` wire messages
//! - [`snapshot`]: the compact pod view sent to clients, plus usage figures
//! - [`projection`]: typed projection from raw watch events to snapshots
//! - [`cluster_metrics`]: cluster-wide metrics payload for `get_metrics`
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod cluster_metrics;
pub mod logging;
pub mod notification;
pub mod projection;
pub mod snapshot;

pub use cluster_metrics::{ClusterMetrics, NamespaceMetrics, NodeMetrics};
pub use notification::{Command, CommandAction, Notification};
pub use projection::{ChangeAction, ProjectionError, RawWatchEvent, project_event, project_object};
pub use snapshot::{PodSnapshot, UsageFigures};
