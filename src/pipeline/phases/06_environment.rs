use crate::error::DeployResult;
use crate::pipeline::context::ReconcileContext;
use crate::pipeline::phase_trait::{PhaseOutcome, ReconcilePhase};
use async_trait::async_trait;
use tracing::debug;

/// Environment items are not published; incremental runs delete them during teardown
pub struct EnvironmentPhase;

#[async_trait]
impl ReconcilePhase for EnvironmentPhase {
    fn name(&self) -> &'static str {
        "Environment"
    }

    async fn execute(
        &self,
        context: &mut ReconcileContext,
        _outcome: &mut PhaseOutcome,
    ) -> DeployResult<()> {
        debug!(
            environments = context
                .repository
                .entries(&crate::model::ArtifactKind::Environment)
                .len(),
            "Environment publishing not enabled"
        );
        Ok(())
    }
}
