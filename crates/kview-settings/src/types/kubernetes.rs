//! Upstream API server connection settings.

use serde::{Deserialize, Serialize};

/// How to reach the Kubernetes API server.
///
/// When `in_cluster` is true and the service-account environment is
/// present, the in-cluster host, token and CA take precedence over
/// `api_server`, `token_file` and `ca_file`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesSettings {
    /// Base URL, e.g. a `kubectl proxy` endpoint.
    pub api_server: String,
    /// Try the pod service account first.
    pub in_cluster: bool,
    /// Bearer token file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,
    /// PEM bundle to trust in addition to the system roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<String>,
    /// Accept any server certificate.
    pub insecure_skip_tls_verify: bool,
    /// Per-request timeout for non-watch calls.
    pub request_timeout_secs: u64,
}

impl Default for KubernetesSettings {
    fn default() -> Self {
        Self {
            api_server: "http://127.0.0.1:8001".to_string(),
            in_cluster: true,
            token_file: None,
            ca_file: None,
            insecure_skip_tls_verify: false,
            request_timeout_secs: 15,
        }
    }
}
