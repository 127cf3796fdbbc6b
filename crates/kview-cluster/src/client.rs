//! [`ClusterQuery`] over the Kubernetes REST API with `reqwest`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use kview_core::{ClusterMetrics, UsageFigures};
use kview_settings::KubernetesSettings;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::errors::{ClusterError, Result};
use crate::query::{ClusterQuery, WatchStream};
use crate::summary::{self, NamespaceView, NodeView, ObjectList, PodPlacement};
use crate::usage;
use crate::watch::parse_watch_lines;

/// Where a pod's service account credentials are mounted.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Resolved API server address and credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Bearer token file, re-read on every request.
    pub token_file: Option<PathBuf>,
    /// Extra PEM bundle to trust.
    pub ca_file: Option<PathBuf>,
    /// Skip server certificate verification.
    pub insecure: bool,
    /// Whether the service account environment was used.
    pub in_cluster: bool,
}

impl ConnectionTarget {
    /// Resolve the target from settings, the process environment and the
    /// service account mount.
    pub fn resolve(settings: &KubernetesSettings) -> Self {
        Self::resolve_with(settings, |k| std::env::var(k).ok(), Path::new(SERVICE_ACCOUNT_DIR))
    }

    /// Resolve with an explicit env lookup and service account directory.
    ///
    /// In-cluster credentials win when `in_cluster` is set, the service host
    /// variables are present and a token is mounted. Otherwise the explicit
    /// `api_server` is used.
    pub fn resolve_with<F>(settings: &KubernetesSettings, env: F, sa_dir: &Path) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if settings.in_cluster {
            let host = env("KUBERNETES_SERVICE_HOST").filter(|h| !h.is_empty());
            let port = env("KUBERNETES_SERVICE_PORT").filter(|p| !p.is_empty());
            let token = sa_dir.join("token");
            if let (Some(host), Some(port)) = (host, port)
                && token.exists()
            {
                let host = if host.contains(':') { format!("[{host}]") } else { host };
                let ca = sa_dir.join("ca.crt");
                return Self {
                    base_url: format!("https://{host}:{port}"),
                    token_file: Some(token),
                    ca_file: ca.exists().then_some(ca),
                    insecure: settings.insecure_skip_tls_verify,
                    in_cluster: true,
                };
            }
        }

        Self {
            base_url: settings.api_server.trim_end_matches('/').to_string(),
            token_file: settings.token_file.as_ref().map(PathBuf::from),
            ca_file: settings.ca_file.as_ref().map(PathBuf::from),
            insecure: settings.insecure_skip_tls_verify,
            in_cluster: false,
        }
    }
}

/// `Status` body returned with API errors.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiStatus {
    message: String,
}

/// Kubernetes REST client.
#[derive(Clone, Debug)]
pub struct KubeClient {
    http: reqwest::Client,
    target: ConnectionTarget,
    request_timeout: Duration,
}

impl KubeClient {
    /// Build a client from settings.
    pub fn from_settings(settings: &KubernetesSettings) -> Result<Self> {
        Self::new(
            ConnectionTarget::resolve(settings),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    /// Build a client for an already resolved target.
    pub fn new(target: ConnectionTarget, request_timeout: Duration) -> Result<Self> {
        if !(target.base_url.starts_with("http://") || target.base_url.starts_with("https://")) {
            return Err(ClusterError::Config(format!(
                "api server must be an http(s) URL, got {:?}",
                target.base_url
            )));
        }

        let mut builder =
            reqwest::Client::builder().user_agent(concat!("kview/", env!("CARGO_PKG_VERSION")));
        if let Some(ca) = &target.ca_file {
            let pem = std::fs::read(ca)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }
        if target.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        info!(
            base_url = %target.base_url,
            in_cluster = target.in_cluster,
            authenticated = target.token_file.is_some(),
            "cluster client configured"
        );

        Ok(Self {
            http,
            target,
            request_timeout,
        })
    }

    /// The resolved connection target.
    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.target.base_url)
    }

    async fn get(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        let request = self.http.get(self.url(path));
        match &self.target.token_file {
            Some(file) => {
                let token = tokio::fs::read_to_string(file).await?;
                Ok(request.bearer_auth(token.trim()))
            }
            None => Ok(request),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .get(path)
            .await?
            .query(query)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiStatus>(&body)
        .ok()
        .map(|s| s.message)
        .filter(|m| !m.is_empty())
        .unwrap_or(body);
    Err(ClusterError::Status {
        code: status.as_u16(),
        message,
    })
}

fn pods_path(namespace: &str) -> String {
    if namespace.is_empty() {
        "/api/v1/pods".to_string()
    } else {
        format!("/api/v1/namespaces/{namespace}/pods")
    }
}

#[async_trait]
impl ClusterQuery for KubeClient {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Value>> {
        let list: ObjectList<Value> = self.get_json(&pods_path(namespace), &[]).await?;
        Ok(list.items)
    }

    async fn pod_usage(&self, namespace: &str, name: &str) -> Result<UsageFigures> {
        let path = format!("{}/{name}", pods_path(namespace));
        let pod: Value = self.get_json(&path, &[]).await?;
        Ok(usage::pod_usage(&pod, Utc::now())?)
    }

    #[instrument(skip_all)]
    async fn cluster_metrics(&self) -> Result<ClusterMetrics> {
        let (nodes, pods, namespaces) = tokio::try_join!(
            self.get_json::<ObjectList<NodeView>>("/api/v1/nodes", &[]),
            self.get_json::<ObjectList<PodPlacement>>("/api/v1/pods", &[]),
            self.get_json::<ObjectList<NamespaceView>>("/api/v1/namespaces", &[]),
        )?;
        Ok(summary::summarize(&nodes.items, &pods.items, &namespaces.items))
    }

    async fn watch_pods(&self, namespace: &str) -> Result<WatchStream> {
        let path = pods_path(namespace);
        debug!(path = %path, "opening pod watch");
        let response = self
            .get(&path)
            .await?
            .query(&[("watch", "true")])
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(parse_watch_lines(response.bytes_stream()).boxed())
    }

    async fn is_healthy(&self) -> bool {
        match self
            .get_json::<ObjectList<NamespaceView>>("/api/v1/namespaces", &[("limit", "1")])
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "cluster health probe failed");
                false
            }
        }
    }
}
