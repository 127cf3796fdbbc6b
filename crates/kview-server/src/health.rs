//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the server is running.
    pub status: String,
    /// Whether the cluster API answered a liveness query.
    pub k8s_connected: bool,
    /// Relay sessions currently open.
    pub connections: usize,
    /// Seconds since the server started.
    pub uptime_secs: u64,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, k8s_connected: bool, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "healthy".into(),
        k8s_connected,
        connections,
        uptime_secs: start_time.elapsed().as_secs(),
    }
}
