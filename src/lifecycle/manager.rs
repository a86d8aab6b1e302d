use crate::access::{reconcile_members, MembershipPlan};
use crate::catalog::{fetch_deployed, Catalog, RepositoryScanner};
use crate::config::DeployConfig;
use crate::error::{error_chain, DeployError, DeployResult};
use crate::model::{ArtifactKind, DeploymentRecord, WorkspaceInfo};
use crate::pipeline::{
    ReconcileContext, ReconcileMode, ReconcileOrchestrator, ReconcileSettings, Services,
};
use crate::progress::ProgressEvent;
use crate::remote::{AccessProvider, CreateWorkspaceOutcome};
use crate::rewrite::LakehouseRef;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    Found,
    Provisioning,
    Reconciling,
    Done,
    Failed,
}

/// Result of a successful deployment
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub workspace: WorkspaceInfo,
    /// Whether this run created the workspace
    pub created: bool,
    pub membership: Option<MembershipPlan>,
    /// Starts with the workspace record
    pub records: Vec<DeploymentRecord>,
}

/// Drives one deployment: resolve or create the workspace, reconcile
/// membership, then reconcile items
pub struct WorkspaceLifecycle {
    config: DeployConfig,
    services: Services,
    access: Arc<dyn AccessProvider>,
}

impl WorkspaceLifecycle {
    pub fn new(config: DeployConfig, services: Services, access: Arc<dyn AccessProvider>) -> Self {
        Self {
            config,
            services,
            access,
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    fn transition(&self, state: LifecycleState) {
        debug!(workspace = %self.config.workspace_name, state = ?state, "Lifecycle state");
    }

    pub async fn run(&self) -> DeployResult<DeploymentReport> {
        let start = Instant::now();
        self.config.validate()?;
        self.services.progress.on_progress(&ProgressEvent::Started {
            workspace: self.config.workspace_name.clone(),
            layer: self.config.layer.clone(),
        });

        let repository = RepositoryScanner::new(self.services.file_system.clone())
            .scan(&self.config.layer_root(), &self.config.layer)
            .map_err(|e| e.in_step("Repository scan"))?;

        let (workspace, created) = match self.resolve_or_create().await {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.fail(e)),
        };
        self.services
            .progress
            .on_progress(&ProgressEvent::WorkspaceResolved {
                workspace_id: workspace.id.clone(),
                created,
            });

        self.transition(LifecycleState::Reconciling);
        match self.reconcile(&workspace, created, repository).await {
            Ok((membership, records)) => {
                let mut ledger = vec![DeploymentRecord::workspace(
                    &workspace.id,
                    &workspace.display_name,
                )];
                ledger.extend(records);

                self.transition(LifecycleState::Done);
                self.services.progress.on_progress(&ProgressEvent::Completed {
                    records: ledger.len(),
                    total_time: start.elapsed(),
                });
                Ok(DeploymentReport {
                    workspace,
                    created,
                    membership,
                    records: ledger,
                })
            }
            Err(e) => {
                if created {
                    self.compensate(&workspace).await;
                }
                Err(self.fail(with_workspace_record(e, &workspace)))
            }
        }
    }

    fn fail(&self, err: DeployError) -> DeployError {
        self.transition(LifecycleState::Failed);
        self.services.progress.on_progress(&ProgressEvent::Failed {
            error: error_chain(&err),
        });
        err
    }

    /// Looks the workspace up by name, creating it when absent
    ///
    /// Returns the workspace and whether this run created it.
    pub async fn resolve_or_create(&self) -> DeployResult<(WorkspaceInfo, bool)> {
        let name = &self.config.workspace_name;
        if let Some(workspace) = self.find_workspace(name).await? {
            self.transition(LifecycleState::Found);
            info!(workspace = %name, id = %workspace.id, "Workspace exists");
            return Ok((workspace, false));
        }

        self.transition(LifecycleState::Absent);
        self.transition(LifecycleState::Provisioning);
        let capacity = self.config.capacity_id.as_deref();
        match self
            .services
            .provider
            .create_workspace(name, capacity)
            .await
            .map_err(|e| e.in_step("Workspace creation"))?
        {
            CreateWorkspaceOutcome::Created(workspace) => {
                info!(workspace = %name, id = %workspace.id, trial = capacity.is_none(), "Workspace created");
                Ok((workspace, true))
            }
            CreateWorkspaceOutcome::Conflict => {
                warn!(workspace = %name, "Workspace name already in use, resolving the existing workspace");
                let workspace =
                    self.find_workspace(name)
                        .await?
                        .ok_or_else(|| DeployError::RemoteConflict {
                            operation: format!("create workspace '{}'", name),
                            message: "name in use but the workspace cannot be found".to_string(),
                        })?;
                self.transition(LifecycleState::Found);
                Ok((workspace, false))
            }
        }
    }

    /// Direct lookup with bounded retry, then a scan of the full listing
    pub async fn find_workspace(&self, name: &str) -> DeployResult<Option<WorkspaceInfo>> {
        let provider = &self.services.provider;
        let attempts = self.config.lookup_attempts.max(1);

        for attempt in 1..=attempts {
            match provider.get_workspace_by_name(name).await {
                Ok(Some(workspace)) => return Ok(Some(workspace)),
                Ok(None) => debug!(workspace = %name, attempt, "Workspace not found by name"),
                Err(e) => warn!(workspace = %name, attempt, error = %e, "Workspace lookup failed"),
            }
            if attempt < attempts && !self.config.lookup_delay.is_zero() {
                tokio::time::sleep(self.config.lookup_delay).await;
            }
        }

        debug!(workspace = %name, "Falling back to the workspace listing");
        Ok(provider
            .list_workspaces()
            .await
            .map_err(|e| e.in_step("Workspace lookup"))?
            .into_iter()
            .find(|w| w.display_name == name))
    }

    async fn reconcile(
        &self,
        workspace: &WorkspaceInfo,
        created: bool,
        repository: Catalog,
    ) -> DeployResult<(Option<MembershipPlan>, Vec<DeploymentRecord>)> {
        let membership = if self.config.members.is_empty() {
            debug!("No members declared, leaving workspace access as is");
            None
        } else {
            let plan = reconcile_members(self.access.as_ref(), &workspace.id, &self.config.members)
                .await
                .map_err(|e| e.in_step("Membership"))?;
            self.services
                .progress
                .on_progress(&ProgressEvent::MembershipReconciled {
                    added: plan.add.len(),
                    updated: plan.update.len(),
                    removed: plan.remove.len(),
                });
            Some(plan)
        };

        let (mode, deployed) = if created {
            (ReconcileMode::Full, Catalog::new())
        } else {
            let deployed = fetch_deployed(self.services.provider.as_ref(), &workspace.id)
                .await
                .map_err(|e| e.in_step("Deployed state fetch"))?;
            (ReconcileMode::Incremental, deployed)
        };

        let mut settings = ReconcileSettings::from_config(&self.config);
        if let (Some(forced), Some(holder)) = (
            settings.forced_lakehouse.as_mut(),
            self.config.default_lakehouse_workspace.as_deref(),
        ) {
            forced.external = Some(self.external_lakehouse(holder, &forced.name).await?);
        }

        let mut context = ReconcileContext::new(
            workspace.clone(),
            mode,
            repository,
            deployed,
            self.services.clone(),
            settings,
        );
        let records = ReconcileOrchestrator::new().execute(&mut context).await?;
        Ok((membership, records))
    }

    /// Lakehouse of another workspace that notebooks get attached to
    async fn external_lakehouse(&self, workspace_name: &str, lakehouse: &str) -> DeployResult<LakehouseRef> {
        let workspace = self.find_workspace(workspace_name).await?.ok_or_else(|| {
            DeployError::validation(format!(
                "workspace '{}' holding the default lakehouse does not exist",
                workspace_name
            ))
        })?;
        let item = self
            .services
            .provider
            .list_items(&workspace.id)
            .await?
            .into_iter()
            .find(|i| i.kind == ArtifactKind::Lakehouse && i.display_name == lakehouse)
            .ok_or_else(|| {
                DeployError::validation(format!(
                    "lakehouse '{}' not found in workspace '{}'",
                    lakehouse, workspace_name
                ))
            })?;
        debug!(lakehouse = %lakehouse, workspace = %workspace_name, id = %item.id, "Default lakehouse resolved");
        Ok(LakehouseRef {
            id: item.id,
            workspace_id: workspace.id,
        })
    }

    /// Best effort: a failed delete is logged and the deployment error still wins
    async fn compensate(&self, workspace: &WorkspaceInfo) {
        warn!(workspace = %workspace.display_name, id = %workspace.id, "Deleting workspace created by the failed run");
        if let Err(e) = self.services.provider.delete_workspace(&workspace.id).await {
            error!(
                workspace = %workspace.display_name,
                error = %error_chain(&e),
                "Could not delete workspace after failure"
            );
        }
    }
}

/// Puts the workspace record in front of the records a partial apply reports
fn with_workspace_record(err: DeployError, workspace: &WorkspaceInfo) -> DeployError {
    match err {
        DeployError::PartialApply {
            phase,
            applied,
            source,
        } => {
            let mut records = vec![DeploymentRecord::workspace(
                &workspace.id,
                &workspace.display_name,
            )];
            records.extend(applied);
            DeployError::PartialApply {
                phase,
                applied: records,
                source,
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use crate::remote::{Call, FailPoint, InMemoryFabric, Member, PollPolicy};
    use serde_json::json;
    use std::time::Duration;

    fn config() -> DeployConfig {
        DeployConfig {
            workspace_name: "Sales".to_string(),
            artifact_root: "/repo".into(),
            layer: "Ops".to_string(),
            poll: PollPolicy::immediate(),
            lookup_delay: Duration::ZERO,
            ..DeployConfig::default()
        }
    }

    fn source_tree() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.add_file(
            "ARM/Ops/Bronze.Lakehouse/.platform",
            &json!({"metadata": {"type": "Lakehouse", "displayName": "Bronze"}}).to_string(),
        );
        fs.add_file("ARM/Ops/Bronze.Lakehouse/lakehouse.metadata.json", "{}");
        fs
    }

    fn lifecycle(fabric: &Arc<InMemoryFabric>, config: DeployConfig) -> WorkspaceLifecycle {
        let services = Services::new(fabric.clone(), fabric.clone(), Arc::new(source_tree()));
        WorkspaceLifecycle::new(config, services, fabric.clone())
    }

    #[tokio::test]
    async fn test_lookup_retries_then_lists() {
        let fabric = Arc::new(InMemoryFabric::new());
        let ws = fabric.seed_workspace("Sales");
        fabric.hide_workspace_lookups(3);

        let found = lifecycle(&fabric, config())
            .find_workspace("Sales")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.id, ws);
        assert_eq!(
            fabric.count_calls(|c| matches!(c, Call::GetWorkspaceByName(_))),
            3
        );
        assert_eq!(fabric.count_calls(|c| matches!(c, Call::ListWorkspaces)), 1);
    }

    #[tokio::test]
    async fn test_lookup_errors_are_retried() {
        let fabric = Arc::new(InMemoryFabric::new());
        let ws = fabric.seed_workspace("Sales");
        fabric.fail_times(FailPoint::GetWorkspaceByName, 2);

        let found = lifecycle(&fabric, config())
            .find_workspace("Sales")
            .await
            .unwrap();

        assert_eq!(found.map(|w| w.id), Some(ws));
        assert_eq!(fabric.count_calls(|c| matches!(c, Call::ListWorkspaces)), 0);
    }

    #[tokio::test]
    async fn test_absent_workspace_is_created_and_fully_deployed() {
        let fabric = Arc::new(InMemoryFabric::new());

        let report = lifecycle(&fabric, config()).run().await.unwrap();

        assert!(report.created);
        assert_eq!(report.records[0].artifact_type, "Workspace");
        assert_eq!(report.records[1].artifact_name, "Bronze");
        assert!(report.membership.is_none());
        assert_eq!(fabric.workspaces().len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_resolves_existing_workspace() {
        let fabric = Arc::new(InMemoryFabric::new());
        let ws = fabric.seed_workspace("Sales");
        fabric.hide_workspace_lookups(4);

        let report = lifecycle(&fabric, config()).run().await.unwrap();

        assert!(!report.created);
        assert_eq!(report.workspace.id, ws);
        assert_eq!(fabric.count_calls(|c| matches!(c, Call::CreateWorkspace(_))), 1);
        assert_eq!(fabric.workspaces().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_after_creation_deletes_workspace() {
        let fabric = Arc::new(InMemoryFabric::new());
        fabric.fail_item("Bronze");

        let err = lifecycle(&fabric, config()).run().await.unwrap_err();

        assert!(matches!(err, DeployError::PartialApply { .. }));
        assert_eq!(err.applied_records()[0].artifact_type, "Workspace");
        assert!(fabric.workspaces().is_empty());
        assert_eq!(fabric.count_calls(|c| matches!(c, Call::DeleteWorkspace(_))), 1);
    }

    #[tokio::test]
    async fn test_failed_cleanup_keeps_original_error() {
        let fabric = Arc::new(InMemoryFabric::new());
        fabric.fail_item("Bronze");
        fabric.fail_times(FailPoint::DeleteWorkspace, 1);

        let err = lifecycle(&fabric, config()).run().await.unwrap_err();

        assert!(matches!(
            err.root_cause(),
            DeployError::RemoteFailure { status: 400, .. }
        ));
        assert_eq!(fabric.workspaces().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_workspace_is_never_deleted() {
        let fabric = Arc::new(InMemoryFabric::new());
        fabric.seed_workspace("Sales");
        fabric.fail_item("Bronze");

        lifecycle(&fabric, config()).run().await.unwrap_err();
        assert_eq!(fabric.count_calls(|c| matches!(c, Call::DeleteWorkspace(_))), 0);
    }

    #[tokio::test]
    async fn test_membership_runs_before_items() {
        let fabric = Arc::new(InMemoryFabric::new());
        let mut config = config();
        config.members = vec![Member {
            identifier: "data-team".to_string(),
            principal_type: "Group".to_string(),
            access: "Admin".to_string(),
        }];

        let report = lifecycle(&fabric, config).run().await.unwrap();

        assert_eq!(report.membership.unwrap().add.len(), 1);
        let calls = fabric.calls();
        let add = calls
            .iter()
            .position(|c| matches!(c, Call::AddMember(_)))
            .unwrap();
        let create = calls
            .iter()
            .position(|c| matches!(c, Call::CreateItem { .. }))
            .unwrap();
        assert!(add < create);
    }

    #[tokio::test]
    async fn test_invalid_config_makes_no_remote_calls() {
        let fabric = Arc::new(InMemoryFabric::new());
        let mut config = config();
        config.workspace_name = String::new();

        let err = lifecycle(&fabric, config).run().await.unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
        assert!(fabric.calls().is_empty());
    }

    #[tokio::test]
    async fn test_external_default_lakehouse() {
        let fabric = Arc::new(InMemoryFabric::new());
        let shared = fabric.seed_workspace("Shared");
        let bronze = fabric.seed_item(&shared, ArtifactKind::Lakehouse, "Bronze");

        let fs = MockFileSystem::new();
        fs.add_file(
            "ARM/Data_Non_Security/Clean.Notebook/.platform",
            &json!({"metadata": {"type": "Notebook", "displayName": "Clean"}}).to_string(),
        );
        fs.add_file(
            "ARM/Data_Non_Security/Clean.Notebook/notebook-content.py",
            "# META {\n# META       \"default_lakehouse_name\": \"\",\n# META       \"default_lakehouse_workspace_id\": \"\"\n# META }\n",
        );
        let config = DeployConfig {
            layer: "Data_Non_Security".to_string(),
            default_lakehouse_workspace: Some("Shared".to_string()),
            ..config()
        };
        let services = Services::new(fabric.clone(), fabric.clone(), Arc::new(fs));
        let report = WorkspaceLifecycle::new(config, services, fabric.clone())
            .run()
            .await
            .unwrap();

        let content = fabric
            .definition(&report.workspace.id, &ArtifactKind::Notebook, "Clean")
            .unwrap()
            .part("notebook-content.py")
            .unwrap()
            .payload
            .clone();
        assert!(content.contains(&format!("\"default_lakehouse\": \"{}\"", bronze)));
        assert!(content.contains(&format!("\"default_lakehouse_workspace_id\": \"{}\"", shared)));
    }
}
