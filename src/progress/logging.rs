//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, error, info};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { workspace, layer } => {
                info!(workspace = %workspace, layer = %layer, "Starting deployment");
            }
            ProgressEvent::WorkspaceResolved {
                workspace_id,
                created,
            } => {
                if *created {
                    info!(workspace_id = %workspace_id, "Workspace created, running full deployment");
                } else {
                    info!(workspace_id = %workspace_id, "Workspace exists, running incremental deployment");
                }
            }
            ProgressEvent::MembershipReconciled {
                added,
                updated,
                removed,
            } => {
                info!(added, updated, removed, "Workspace membership reconciled");
            }
            ProgressEvent::PhaseStarted { phase } => {
                info!(phase = %phase, "Starting phase");
            }
            ProgressEvent::PhaseComplete {
                phase,
                records,
                duration,
            } => {
                info!(
                    phase = %phase,
                    records,
                    duration_ms = duration.as_millis(),
                    "Phase complete"
                );
            }
            ProgressEvent::ItemDeployed {
                kind,
                name,
                created,
            } => {
                let action = if *created { "created" } else { "updated" };
                info!(kind = %kind, item = %name, action, "Item deployed");
            }
            ProgressEvent::ItemDeleted { kind, name } => {
                info!(kind = %kind, item = %name, "Item deleted");
            }
            ProgressEvent::Quiescing { pending } => {
                debug!(pending, "Waiting for deletions to settle");
            }
            ProgressEvent::Completed {
                records,
                total_time,
            } => {
                info!(
                    records,
                    total_time_ms = total_time.as_millis(),
                    "Deployment complete"
                );
            }
            ProgressEvent::Failed { error } => {
                error!(error = %error, "Deployment failed");
            }
        }
    }
}
