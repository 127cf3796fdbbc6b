//! Per-session relay tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and capacity knobs for every relay session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Bounded outbound channel capacity.
    pub outbound_capacity: usize,
    /// Server-initiated ping cadence.
    pub ping_interval_secs: u64,
    /// Read deadline, refreshed on every pong.
    pub pong_wait_secs: u64,
    /// Deadline for a single frame write.
    pub write_wait_secs: u64,
    /// Fixed delay before re-opening a closed upstream watch.
    pub watch_backoff_ms: u64,
    /// Consecutive re-open failures tolerated before the session is closed.
    pub max_reopen_failures: u32,
    /// Grace period for the loops to exit after cancellation.
    pub teardown_timeout_secs: u64,
    /// Publish an `error` notification when a command's query fails.
    pub report_command_errors: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            ping_interval_secs: 30,
            pong_wait_secs: 60,
            write_wait_secs: 10,
            watch_backoff_ms: 1000,
            max_reopen_failures: 5,
            teardown_timeout_secs: 5,
            report_command_errors: false,
        }
    }
}

impl RelaySettings {
    /// Ping cadence.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Read deadline window.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Write deadline.
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    /// Watch re-open backoff.
    pub fn watch_backoff(&self) -> Duration {
        Duration::from_millis(self.watch_backoff_ms)
    }

    /// Teardown grace period.
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_secs)
    }
}
