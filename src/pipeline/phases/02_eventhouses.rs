use crate::error::DeployResult;
use crate::model::ArtifactKind;
use crate::pipeline::context::ReconcileContext;
use crate::pipeline::phase_trait::{PhaseOutcome, ReconcilePhase};
use async_trait::async_trait;

use super::lakehouses::ensure_items;

/// Eventhouses are create-only, like lakehouses
pub struct EventhousePhase;

#[async_trait]
impl ReconcilePhase for EventhousePhase {
    fn name(&self) -> &'static str {
        "Eventhouses"
    }

    async fn execute(
        &self,
        context: &mut ReconcileContext,
        outcome: &mut PhaseOutcome,
    ) -> DeployResult<()> {
        ensure_items(context, outcome, ArtifactKind::Eventhouse).await
    }
}
