//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`KviewSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::KviewSettings;

/// Resolve the default settings file path (`~/.kview/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".kview").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<KviewSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, defaults are used. Invalid JSON or an
/// invalid merged value is an error.
pub fn load_settings_from_path(path: &Path) -> Result<KviewSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<KviewSettings> {
    let defaults = serde_json::to_value(KviewSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `KVIEW_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut KviewSettings) {
    apply_overrides_with(settings, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary key lookup.
///
/// Invalid values are logged and ignored (file/default value wins).
pub fn apply_overrides_with<F>(settings: &mut KviewSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("KVIEW_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("KVIEW_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("KVIEW_ALLOWED_ORIGINS") {
        settings.server.allowed_origins = parse_list(&v);
    }

    // ── Relay ───────────────────────────────────────────────────────
    if let Some(v) = env.usize("KVIEW_OUTBOUND_CAPACITY", 1, 65_536) {
        settings.relay.outbound_capacity = v;
    }
    if let Some(v) = env.u64("KVIEW_PING_INTERVAL_SECS", 1, 3600) {
        settings.relay.ping_interval_secs = v;
    }
    if let Some(v) = env.u64("KVIEW_PONG_WAIT_SECS", 1, 7200) {
        settings.relay.pong_wait_secs = v;
    }
    if let Some(v) = env.u64("KVIEW_WRITE_WAIT_SECS", 1, 600) {
        settings.relay.write_wait_secs = v;
    }
    if let Some(v) = env.u64("KVIEW_WATCH_BACKOFF_MS", 10, 600_000) {
        settings.relay.watch_backoff_ms = v;
    }
    if let Some(v) = env.u64("KVIEW_MAX_REOPEN_FAILURES", 1, 1_000_000) {
        settings.relay.max_reopen_failures = u32::try_from(v).unwrap_or(u32::MAX);
    }
    if let Some(v) = env.bool("KVIEW_REPORT_COMMAND_ERRORS") {
        settings.relay.report_command_errors = v;
    }

    // ── Kubernetes ──────────────────────────────────────────────────
    if let Some(v) = env.string("KVIEW_API_SERVER") {
        settings.kubernetes.api_server = v;
    }
    if let Some(v) = env.bool("KVIEW_IN_CLUSTER") {
        settings.kubernetes.in_cluster = v;
    }
    if let Some(v) = env.string("KVIEW_TOKEN_FILE") {
        settings.kubernetes.token_file = Some(v);
    }
    if let Some(v) = env.string("KVIEW_CA_FILE") {
        settings.kubernetes.ca_file = Some(v);
    }
    if let Some(v) = env.bool("KVIEW_INSECURE_SKIP_TLS_VERIFY") {
        settings.kubernetes.insecure_skip_tls_verify = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("KVIEW_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("KVIEW_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.logging.format = format,
            Err(e) => tracing::warn!(key = "KVIEW_LOG_FORMAT", value = %v, error = %e, "ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, trimming blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ── Env readers (thin wrappers) ─────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}
