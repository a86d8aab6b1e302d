//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while a deployment runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started { workspace: String, layer: String },

    WorkspaceResolved { workspace_id: String, created: bool },

    MembershipReconciled {
        added: usize,
        updated: usize,
        removed: usize,
    },

    PhaseStarted { phase: String },

    PhaseComplete {
        phase: String,
        records: usize,
        duration: Duration,
    },

    /// An item was created or its definition updated
    ItemDeployed {
        kind: String,
        name: String,
        created: bool,
    },

    ItemDeleted { kind: String, name: String },

    /// Waiting for deletions to disappear from the workspace listing
    Quiescing { pending: usize },

    Completed {
        records: usize,
        total_time: Duration,
    },

    Failed { error: String },
}

pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
