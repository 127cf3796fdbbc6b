//! # kview-cluster
//!
//! The query side of the relay: everything the session needs to ask of the
//! cluster, behind the [`ClusterQuery`] trait.
//!
//! - [`query`]: the [`ClusterQuery`] trait and the [`WatchStream`] alias
//! - [`client`]: [`KubeClient`], a `reqwest` implementation against the Kubernetes REST API
//! - [`watch`]: newline-delimited JSON watch stream parser
//! - [`usage`]: per-pod usage figures and age formatting
//! - [`summary`]: cluster-wide metrics aggregation
//! - [`quantity`]: resource quantity parsing, summing and canonical rendering

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod quantity;
pub mod query;
pub mod summary;
pub mod usage;
pub mod watch;

pub use client::{ConnectionTarget, KubeClient};
pub use errors::{ClusterError, Result};
pub use query::{ClusterQuery, WatchStream};
