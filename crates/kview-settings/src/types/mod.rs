//! Settings types, one submodule per section.

mod kubernetes;
mod relay;
mod server;

pub use kubernetes::KubernetesSettings;
pub use relay::RelaySettings;
pub use server::{LoggingSettings, ServerSettings};

use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KviewSettings {
    /// HTTP listener and origin policy.
    pub server: ServerSettings,
    /// Per-session relay tuning.
    pub relay: RelaySettings,
    /// Upstream API server connection.
    pub kubernetes: KubernetesSettings,
    /// Log level and format.
    pub logging: LoggingSettings,
}

impl KviewSettings {
    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        let relay = &self.relay;
        require_positive("relay.outboundCapacity", relay.outbound_capacity as u64)?;
        require_positive("relay.pingIntervalSecs", relay.ping_interval_secs)?;
        require_positive("relay.writeWaitSecs", relay.write_wait_secs)?;
        require_positive("relay.teardownTimeoutSecs", relay.teardown_timeout_secs)?;
        require_positive("relay.maxReopenFailures", u64::from(relay.max_reopen_failures))?;
        require_positive(
            "kubernetes.requestTimeoutSecs",
            self.kubernetes.request_timeout_secs,
        )?;
        if self.relay.pong_wait_secs <= self.relay.ping_interval_secs {
            return Err(crate::SettingsError::InvalidValue(format!(
                "relay.pongWaitSecs ({}) must exceed relay.pingIntervalSecs ({})",
                self.relay.pong_wait_secs, self.relay.ping_interval_secs
            )));
        }
        Ok(())
    }
}

fn require_positive(field: &str, value: u64) -> crate::Result<()> {
    if value == 0 {
        return Err(crate::SettingsError::InvalidValue(format!("{field} must be > 0")));
    }
    Ok(())
}
