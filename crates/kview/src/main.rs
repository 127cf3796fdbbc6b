//! # kview
//!
//! Relay binary: loads settings, connects to the cluster API and serves
//! live pod changes to WebSocket clients until SIGINT/SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kview_cluster::KubeClient;
use kview_core::logging::{LogFormat, init_subscriber};
use kview_server::KviewServer;
use kview_settings::KviewSettings;

/// Live Kubernetes pod relay.
#[derive(Parser, Debug)]
#[command(name = "kview", about = "Live Kubernetes pod relay over WebSocket")]
struct Cli {
    /// Settings file (defaults to `~/.kview/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive, e.g. `info` or `kview_server=debug` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Log line format: `text` or `json` (overrides settings).
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn load_settings(&self) -> Result<KviewSettings> {
        let mut settings = match &self.config {
            Some(path) => kview_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => kview_settings::load_settings().context("Failed to load settings")?,
        };
        self.apply_overrides(&mut settings);
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut KviewSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics = kview_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let client = KubeClient::from_settings(&settings.kubernetes)
        .context("Failed to create cluster client")?;
    tracing::info!(
        api_server = %client.target().base_url,
        in_cluster = client.target().in_cluster,
        "cluster client ready"
    );

    let shutdown_timeout = Duration::from_secs(settings.server.shutdown_timeout_secs);
    let server = KviewServer::new(settings, Arc::new(client), metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("kview relay listening on http://{addr} (ws://{addr}/ws)");

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    let _ = server.shutdown().drain(shutdown_timeout).await;
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or (on unix) SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl-c")
    }
}
