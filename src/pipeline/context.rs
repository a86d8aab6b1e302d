//! Reconciliation context for managing dependencies

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::fs::FileSystem;
use crate::model::WorkspaceInfo;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::remote::{ConnectionResolver, RateLimiter, Unlimited, WorkspaceProvider};

use super::config::ReconcileSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Freshly created workspace, nothing deployed yet
    Full,
    /// Existing workspace; stale items are torn down
    Incremental,
}

/// Remote and local collaborators shared by every phase
#[derive(Clone)]
pub struct Services {
    pub provider: Arc<dyn WorkspaceProvider>,
    pub connections: Arc<dyn ConnectionResolver>,
    pub file_system: Arc<dyn FileSystem>,
    pub limiter: Arc<dyn RateLimiter>,
    pub progress: Arc<dyn ProgressHandler>,
}

impl Services {
    /// No rate limiting and no progress reporting
    pub fn new(
        provider: Arc<dyn WorkspaceProvider>,
        connections: Arc<dyn ConnectionResolver>,
        file_system: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            provider,
            connections,
            file_system,
            limiter: Arc::new(Unlimited),
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }
}

/// State carried through the phases of one reconciliation
pub struct ReconcileContext {
    pub workspace: WorkspaceInfo,
    pub mode: ReconcileMode,
    /// Desired items; runtime ids are filled in as items get deployed
    pub repository: Catalog,
    /// Items found in the workspace when the run started
    pub deployed: Catalog,
    pub services: Services,
    pub settings: ReconcileSettings,
    /// Ids deleted so far, awaited by the quiescence wait
    pub deleted_ids: Vec<String>,
}

impl ReconcileContext {
    pub fn new(
        workspace: WorkspaceInfo,
        mode: ReconcileMode,
        repository: Catalog,
        deployed: Catalog,
        services: Services,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            workspace,
            mode,
            repository,
            deployed,
            services,
            settings,
            deleted_ids: Vec::new(),
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace.id
    }

    pub fn emit(&self, event: ProgressEvent) {
        self.services.progress.on_progress(&event);
    }
}
