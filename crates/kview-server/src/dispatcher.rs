//! Client command interpretation.

use std::sync::Arc;

use kview_cluster::ClusterQuery;
use kview_core::{Command, CommandAction, Notification};
use tracing::{debug, info, instrument, warn};

use crate::publisher::{PublishOutcome, Publisher};
use crate::teardown::Teardown;

/// Routes decoded commands to the cluster and publishes any result.
///
/// No command is ever fatal to the session.
pub struct CommandDispatcher {
    cluster: Arc<dyn ClusterQuery>,
    publisher: Publisher,
    report_errors: bool,
}

impl CommandDispatcher {
    /// Create a dispatcher publishing onto `publisher`.
    ///
    /// With `report_errors`, a failed query publishes an `error`
    /// notification instead of nothing.
    pub fn new(cluster: Arc<dyn ClusterQuery>, publisher: Publisher, report_errors: bool) -> Self {
        Self {
            cluster,
            publisher,
            report_errors,
        }
    }

    /// Handle one command. Queries are abandoned if teardown starts.
    #[instrument(skip_all, fields(action = %command.action))]
    pub async fn dispatch(&self, command: &Command, teardown: &Teardown) {
        let namespace = command.namespace.as_deref().unwrap_or_default();
        match command.parsed_action() {
            CommandAction::SubscribePods => {
                info!(namespace, "client subscribed to pods");
            }
            CommandAction::SubscribeNodes => {
                info!("client subscribed to nodes");
            }
            CommandAction::GetMetrics => self.publish_metrics(teardown).await,
            CommandAction::Unknown => {
                warn!(namespace, "ignoring unknown command action");
            }
        }
    }

    async fn publish_metrics(&self, teardown: &Teardown) {
        let result = tokio::select! {
            biased;
            () = teardown.cancelled() => return,
            result = self.cluster.cluster_metrics() => result,
        };

        let notification = match result {
            Ok(metrics) => Notification::metrics(&metrics),
            Err(e) => {
                warn!(error = %e, status = ?e.status_code(), "cluster metrics query failed");
                if !self.report_errors {
                    return;
                }
                Notification::command_error("get_metrics", &e.to_string())
            }
        };

        if self.publisher.publish(notification) == PublishOutcome::Closed {
            debug!("outbound channel closed, metrics discarded");
        }
    }
}
