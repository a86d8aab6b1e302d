use super::item_helper::{deploy_item, read_definition, record_action};
use crate::error::{DeployError, DeployResult};
use crate::graph::publish_order;
use crate::model::ArtifactKind;
use crate::pipeline::context::ReconcileContext;
use crate::pipeline::phase_trait::{PhaseOutcome, ReconcilePhase};
use crate::rewrite::{BindingContext, KustoBinding, ReferenceRewriter};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Publishes pipelines so that every invoked pipeline exists before its callers
pub struct DataPipelinePhase;

impl DataPipelinePhase {
    /// Connection type to connection id, for the connections that resolve
    async fn resolve_connections(
        context: &ReconcileContext,
    ) -> DeployResult<HashMap<String, String>> {
        let mut resolved = HashMap::new();
        for spec in &context.settings.connections {
            match context
                .services
                .connections
                .resolve_connection_id(&spec.connection_name)
                .await?
            {
                Some(id) => {
                    debug!(connection_type = %spec.connection_type, connection = %spec.connection_name, id = %id, "Connection resolved");
                    resolved.insert(spec.connection_type.clone(), id);
                }
                None => warn!(
                    connection_type = %spec.connection_type,
                    connection = %spec.connection_name,
                    "Connection not found, bindings of this type are left as exported"
                ),
            }
        }
        Ok(resolved)
    }

    /// Query endpoint and KQL database of the first eventhouse in the workspace
    async fn resolve_kusto(context: &ReconcileContext) -> DeployResult<Option<KustoBinding>> {
        let kind = ArtifactKind::Eventhouse;
        let Some((name, eventhouse_id)) = context
            .repository
            .entries(&kind)
            .iter()
            .chain(context.deployed.entries(&kind))
            .find_map(|e| e.id.clone().map(|id| (e.display_name.clone(), id)))
        else {
            return Ok(None);
        };

        let provider = &context.services.provider;
        let database = provider
            .list_items(context.workspace_id())
            .await?
            .into_iter()
            .find(|item| item.kind == ArtifactKind::KqlDatabase && item.display_name == name);
        let Some(database) = database else {
            warn!(eventhouse = %name, "No KQL database found for eventhouse, Kusto bindings left as exported");
            return Ok(None);
        };

        match provider
            .eventhouse_query_uri(context.workspace_id(), &eventhouse_id)
            .await?
        {
            Some(endpoint) => Ok(Some(KustoBinding {
                endpoint,
                database_id: database.id,
            })),
            None => {
                warn!(eventhouse = %name, "Eventhouse has no query endpoint yet, Kusto bindings left as exported");
                Ok(None)
            }
        }
    }

    /// Logical ids are replaced first, then data-source bindings are re-pointed
    fn rewrite_content(
        context: &ReconcileContext,
        bindings: &BindingContext,
        name: &str,
        text: &str,
    ) -> DeployResult<String> {
        let rewritten = ReferenceRewriter::new(&context.repository, context.workspace_id())
            .rewrite(text)?;
        let mut definition: Value = serde_json::from_str(&rewritten)
            .map_err(|e| DeployError::json(format!("pipeline '{}'", name), e))?;
        let changed = bindings.apply(&mut definition);
        debug!(item = %name, bindings = changed, "Pipeline bindings rewritten");
        serde_json::to_string_pretty(&definition)
            .map_err(|e| DeployError::json(format!("pipeline '{}'", name), e))
    }
}

#[async_trait]
impl ReconcilePhase for DataPipelinePhase {
    fn name(&self) -> &'static str {
        "Data Pipelines"
    }

    async fn execute(
        &self,
        context: &mut ReconcileContext,
        outcome: &mut PhaseOutcome,
    ) -> DeployResult<()> {
        let kind = ArtifactKind::DataPipeline;
        if context.repository.entries(&kind).is_empty() {
            debug!("No pipelines to publish");
            return Ok(());
        }

        let order = publish_order(&context.repository, context.services.file_system.as_ref())?;
        info!(order = ?order, "Pipeline publish order");

        let bindings = BindingContext {
            workspace_id: context.workspace.id.clone(),
            connections: Self::resolve_connections(context).await?,
            kusto: Self::resolve_kusto(context).await?,
        };
        let content_file = kind.content_file().unwrap_or_default();

        for name in order {
            let Some(entry) = context.repository.get(&kind, &name).cloned() else {
                continue;
            };

            let definition = read_definition(context, &entry, false, |path, text| {
                if path == content_file {
                    Self::rewrite_content(context, &bindings, &name, &text)
                } else {
                    Ok(text)
                }
            })
            .map_err(|e| e.for_item(kind.as_str(), &name))?;

            let action = deploy_item(context, &kind, &entry, Some(definition))
                .await
                .map_err(|e| e.for_item(kind.as_str(), &name))?;
            record_action(context, outcome, &kind, &name, &action);
        }
        Ok(())
    }
}
