//! # kview-settings
//!
//! Configuration management with layered sources for the kview relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`KviewSettings::default()`]
//! 2. **Settings file**: `~/.kview/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `KVIEW_*` overrides (highest priority)
//!
//! The loaded value is passed explicitly into the server; there is no
//! process-wide settings global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = KviewSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_match_relay_contract() {
        let settings = KviewSettings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert!(settings.server.allowed_origins.is_empty());
        assert_eq!(settings.relay.outbound_capacity, 256);
        assert_eq!(settings.relay.ping_interval_secs, 30);
        assert_eq!(settings.relay.pong_wait_secs, 60);
        assert_eq!(settings.relay.write_wait_secs, 10);
        assert_eq!(settings.relay.watch_backoff_ms, 1000);
        assert_eq!(settings.relay.max_reopen_failures, 5);
        assert!(!settings.relay.report_command_errors);
        assert_eq!(settings.kubernetes.api_server, "http://127.0.0.1:8001");
        assert_eq!(settings.logging.level, "info");
    }
}
