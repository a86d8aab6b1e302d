use super::item_helper::{deploy_item, record_action};
use crate::error::DeployResult;
use crate::model::ArtifactKind;
use crate::pipeline::context::ReconcileContext;
use crate::pipeline::phase_trait::{PhaseOutcome, ReconcilePhase};
use async_trait::async_trait;
use tracing::debug;

/// Creates repository items of a create-only kind that the workspace lacks
///
/// Items already present keep their content; only their ids are recorded.
pub(crate) async fn ensure_items(
    context: &mut ReconcileContext,
    outcome: &mut PhaseOutcome,
    kind: ArtifactKind,
) -> DeployResult<()> {
    let entries = context.repository.entries(&kind).to_vec();
    debug!(kind = %kind, count = entries.len(), "Ensuring items exist");

    for entry in entries {
        let action = deploy_item(context, &kind, &entry, None)
            .await
            .map_err(|e| e.for_item(kind.as_str(), &entry.display_name))?;
        record_action(context, outcome, &kind, &entry.display_name, &action);
    }
    Ok(())
}

pub struct LakehousePhase;

#[async_trait]
impl ReconcilePhase for LakehousePhase {
    fn name(&self) -> &'static str {
        "Lakehouses"
    }

    async fn execute(
        &self,
        context: &mut ReconcileContext,
        outcome: &mut PhaseOutcome,
    ) -> DeployResult<()> {
        ensure_items(context, outcome, ArtifactKind::Lakehouse).await
    }
}
