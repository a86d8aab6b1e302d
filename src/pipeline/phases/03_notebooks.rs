use super::item_helper::{delete_item, deploy_item, read_definition, record_action};
use crate::error::DeployResult;
use crate::model::ArtifactKind;
use crate::pipeline::context::ReconcileContext;
use crate::pipeline::phase_trait::{PhaseOutcome, ReconcilePhase};
use crate::rewrite::{attach_lakehouse, AttachmentPolicy, LakehouseRef};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

pub struct NotebookPhase;

impl NotebookPhase {
    /// Lakehouses notebooks may be attached to, by name
    ///
    /// Under a forcing policy only lakehouses whose name contains the forced
    /// name stay eligible, and an external lakehouse replaces a local one.
    pub fn attachment_policy(context: &ReconcileContext) -> AttachmentPolicy {
        let kind = ArtifactKind::Lakehouse;
        let mut lakehouses = HashMap::new();
        for catalog in [&context.deployed, &context.repository] {
            for entry in catalog.entries(&kind) {
                if let Some(id) = &entry.id {
                    lakehouses.insert(
                        entry.display_name.clone(),
                        LakehouseRef {
                            id: id.clone(),
                            workspace_id: context.workspace.id.clone(),
                        },
                    );
                }
            }
        }

        let forced = context.settings.forced_lakehouse.as_ref().map(|forced| {
            lakehouses.retain(|name, _| name.contains(forced.name.as_str()));
            if let Some(external) = &forced.external {
                lakehouses.insert(forced.name.clone(), external.clone());
            }
            forced.name.clone()
        });

        AttachmentPolicy { lakehouses, forced }
    }

    async fn delete_stale(context: &mut ReconcileContext) -> DeployResult<()> {
        let kind = ArtifactKind::Notebook;
        let stale: Vec<(String, String)> = context
            .deployed
            .entries(&kind)
            .iter()
            .filter(|e| !context.repository.contains(&kind, &e.display_name))
            .filter_map(|e| e.id.clone().map(|id| (e.display_name.clone(), id)))
            .collect();

        if !stale.is_empty() {
            info!(count = stale.len(), "Deleting notebooks no longer in the repository");
        }
        for (name, id) in stale {
            delete_item(context, &kind, &name, &id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReconcilePhase for NotebookPhase {
    fn name(&self) -> &'static str {
        "Notebooks"
    }

    async fn execute(
        &self,
        context: &mut ReconcileContext,
        outcome: &mut PhaseOutcome,
    ) -> DeployResult<()> {
        Self::delete_stale(context).await?;

        let kind = ArtifactKind::Notebook;
        let policy = Self::attachment_policy(context);
        let content_file = kind.content_file().unwrap_or_default();

        for entry in context.repository.entries(&kind).to_vec() {
            let definition = read_definition(context, &entry, true, |path, text| {
                Ok(if path == content_file {
                    attach_lakehouse(&text, &policy)
                } else {
                    text
                })
            })
            .map_err(|e| e.for_item(kind.as_str(), &entry.display_name))?;
            debug!(item = %entry.display_name, parts = definition.parts.len(), "Notebook definition prepared");

            let action = deploy_item(context, &kind, &entry, Some(definition))
                .await
                .map_err(|e| e.for_item(kind.as_str(), &entry.display_name))?;
            record_action(context, outcome, &kind, &entry.display_name, &action);
        }
        Ok(())
    }
}
