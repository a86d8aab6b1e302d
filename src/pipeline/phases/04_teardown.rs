use super::item_helper::delete_item;
use crate::config::Quiescence;
use crate::error::DeployResult;
use crate::graph::deployed_graph;
use crate::model::ArtifactKind;
use crate::pipeline::context::ReconcileContext;
use crate::pipeline::phase_trait::{PhaseOutcome, ReconcilePhase};
use crate::progress::ProgressEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Removes what an incremental run must not keep: every environment item and
/// the pipelines no longer in the repository
pub struct TeardownPhase;

impl TeardownPhase {
    async fn delete_environments(context: &mut ReconcileContext) -> DeployResult<()> {
        let kind = ArtifactKind::Environment;
        let environments: Vec<(String, String)> = context
            .deployed
            .entries(&kind)
            .iter()
            .filter_map(|e| e.id.clone().map(|id| (e.display_name.clone(), id)))
            .collect();

        for (name, id) in environments {
            delete_item(context, &kind, &name, &id).await?;
        }
        Ok(())
    }

    /// Referrers are deleted before the pipelines they invoke
    async fn delete_stale_pipelines(context: &mut ReconcileContext) -> DeployResult<()> {
        let kind = ArtifactKind::DataPipeline;
        let stale: HashSet<String> = context
            .deployed
            .names(&kind)
            .into_iter()
            .filter(|name| !context.repository.contains(&kind, name))
            .collect();
        if stale.is_empty() {
            debug!("No stale pipelines");
            return Ok(());
        }

        let content_file = kind.content_file().unwrap_or_default();
        let mut definitions = Vec::with_capacity(stale.len());
        for entry in context.deployed.entries(&kind) {
            let Some(id) = entry.id.as_deref().filter(|_| stale.contains(&entry.display_name))
            else {
                continue;
            };
            let definition = context
                .services
                .provider
                .get_item_definition(context.workspace_id(), id)
                .await
                .map_err(|e| e.for_item(kind.as_str(), &entry.display_name))?;
            let content = definition
                .part_named(content_file)
                .and_then(|part| match serde_json::from_str::<Value>(&part.payload) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(item = %entry.display_name, error = %e, "Deployed pipeline content is not JSON, ignoring its references");
                        None
                    }
                })
                .unwrap_or(Value::Null);
            definitions.push((entry.display_name.clone(), content));
        }

        let order = deployed_graph(&context.deployed, &definitions).teardown_order(&stale)?;
        info!(count = order.len(), "Deleting pipelines no longer in the repository");

        for name in order {
            let Some(id) = context.deployed.id_of(&kind, &name).map(str::to_string) else {
                continue;
            };
            delete_item(context, &kind, &name, &id).await?;
        }
        Ok(())
    }
}

/// Waits until deleted items stop showing up in the workspace listing
///
/// In probe mode a timeout only logs a warning; the run continues.
pub async fn wait_for_quiescence(context: &ReconcileContext) -> DeployResult<()> {
    if context.deleted_ids.is_empty() {
        return Ok(());
    }
    let deleted: HashSet<&str> = context.deleted_ids.iter().map(String::as_str).collect();

    match context.settings.quiescence {
        Quiescence::Fixed(wait) => {
            info!(wait_secs = wait.as_secs(), pending = deleted.len(), "Waiting for deletions to settle");
            context.emit(ProgressEvent::Quiescing {
                pending: deleted.len(),
            });
            tokio::time::sleep(wait).await;
            Ok(())
        }
        Quiescence::Probe { interval, timeout } => {
            let start = Instant::now();
            loop {
                let visible = context
                    .services
                    .provider
                    .list_items(context.workspace_id())
                    .await?
                    .iter()
                    .filter(|item| deleted.contains(item.id.as_str()))
                    .count();
                if visible == 0 {
                    debug!(elapsed_ms = start.elapsed().as_millis(), "Deletions settled");
                    return Ok(());
                }
                context.emit(ProgressEvent::Quiescing { pending: visible });

                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    warn!(
                        pending = visible,
                        timeout_secs = timeout.as_secs(),
                        "Deleted items still listed, continuing anyway"
                    );
                    return Ok(());
                }
                let delay: Duration = interval.min(timeout - elapsed);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl ReconcilePhase for TeardownPhase {
    fn name(&self) -> &'static str {
        "Teardown"
    }

    async fn execute(
        &self,
        context: &mut ReconcileContext,
        _outcome: &mut PhaseOutcome,
    ) -> DeployResult<()> {
        Self::delete_environments(context).await?;
        Self::delete_stale_pipelines(context).await?;
        wait_for_quiescence(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{catalog_from_items, Catalog, CatalogEntry};
    use crate::fs::MockFileSystem;
    use crate::model::WorkspaceInfo;
    use crate::pipeline::config::ReconcileSettings;
    use crate::pipeline::context::{ReconcileMode, Services};
    use crate::remote::{Call, DefinitionPart, InMemoryFabric, ItemDefinition};
    use serde_json::json;
    use std::sync::Arc;

    fn pipeline_definition(invokes: &[&str]) -> ItemDefinition {
        let activities: Vec<Value> = invokes
            .iter()
            .map(|id| json!({"type": "ExecutePipeline", "typeProperties": {"pipeline": {"referenceName": id}}}))
            .collect();
        ItemDefinition::new(vec![DefinitionPart {
            path: "pipeline-content.json".to_string(),
            payload: json!({"properties": {"activities": activities}}).to_string(),
        }])
    }

    fn context(
        fabric: &Arc<InMemoryFabric>,
        ws: &str,
        repository: Catalog,
        quiescence: Quiescence,
    ) -> ReconcileContext {
        let deployed = catalog_from_items(fabric.items(ws));
        ReconcileContext::new(
            WorkspaceInfo {
                id: ws.to_string(),
                display_name: "Sales".to_string(),
            },
            ReconcileMode::Incremental,
            repository,
            deployed,
            Services::new(fabric.clone(), fabric.clone(), Arc::new(MockFileSystem::new())),
            ReconcileSettings::default().with_quiescence(quiescence),
        )
    }

    fn quick_probe() -> Quiescence {
        Quiescence::Probe {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_referrers_deleted_first() {
        let fabric = Arc::new(InMemoryFabric::new());
        let ws = fabric.seed_workspace("Sales");
        let child = fabric.seed_item_with_definition(
            &ws,
            ArtifactKind::DataPipeline,
            "Child",
            pipeline_definition(&[]),
        );
        let parent = fabric.seed_item_with_definition(
            &ws,
            ArtifactKind::DataPipeline,
            "Parent",
            pipeline_definition(&[&child]),
        );
        let kept = fabric.seed_item(&ws, ArtifactKind::DataPipeline, "Kept");
        let env = fabric.seed_item(&ws, ArtifactKind::Environment, "Spark");

        let mut repository = Catalog::new();
        repository
            .insert(
                ArtifactKind::DataPipeline,
                CatalogEntry {
                    display_name: "Kept".to_string(),
                    description: None,
                    logical_id: None,
                    id: None,
                    folder: None,
                    source_paths: Vec::new(),
                },
            )
            .unwrap();

        let mut ctx = context(&fabric, &ws, repository, quick_probe());
        TeardownPhase
            .execute(&mut ctx, &mut PhaseOutcome::default())
            .await
            .unwrap();

        let deletes: Vec<String> = fabric
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DeleteItem { item_id } => Some(item_id),
                _ => None,
            })
            .collect();
        assert_eq!(deletes, vec![env, parent, child]);
        assert_eq!(fabric.items(&ws).len(), 1);
        assert_eq!(fabric.items(&ws)[0].id, kept);
    }

    #[tokio::test]
    async fn test_probe_waits_for_lingering_items() {
        let fabric = Arc::new(InMemoryFabric::new());
        let ws = fabric.seed_workspace("Sales");
        fabric.seed_item(&ws, ArtifactKind::Environment, "Spark");
        fabric.linger_deleted(3);

        let mut ctx = context(&fabric, &ws, Catalog::new(), quick_probe());
        TeardownPhase
            .execute(&mut ctx, &mut PhaseOutcome::default())
            .await
            .unwrap();

        assert_eq!(
            fabric.count_calls(|c| matches!(c, Call::ListItems(_))),
            4
        );
    }

    #[tokio::test]
    async fn test_probe_timeout_continues() {
        let fabric = Arc::new(InMemoryFabric::new());
        let ws = fabric.seed_workspace("Sales");
        fabric.seed_item(&ws, ArtifactKind::Environment, "Spark");
        fabric.linger_deleted(100);

        let quiescence = Quiescence::Probe {
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
        };
        let mut ctx = context(&fabric, &ws, Catalog::new(), quiescence);
        TeardownPhase
            .execute(&mut ctx, &mut PhaseOutcome::default())
            .await
            .unwrap();

        assert_eq!(
            fabric.count_calls(|c| matches!(c, Call::ListItems(_))),
            1
        );
    }

    #[tokio::test]
    async fn test_nothing_deleted_skips_wait() {
        let fabric = Arc::new(InMemoryFabric::new());
        let ws = fabric.seed_workspace("Sales");
        let mut ctx = context(&fabric, &ws, Catalog::new(), Quiescence::Fixed(Duration::from_secs(3600)));

        TeardownPhase
            .execute(&mut ctx, &mut PhaseOutcome::default())
            .await
            .unwrap();
        assert!(fabric.calls().is_empty());
    }
}
