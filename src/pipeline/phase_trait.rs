use super::context::ReconcileContext;
use crate::error::DeployResult;
use crate::model::DeploymentRecord;
use async_trait::async_trait;

/// Changes applied by one phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub records: Vec<DeploymentRecord>,
}

impl PhaseOutcome {
    pub fn push(&mut self, record: DeploymentRecord) {
        self.records.push(record);
    }
}

/// A phase fills `outcome` as it goes, so records applied before a failure
/// are still known to the orchestrator.
#[async_trait]
pub trait ReconcilePhase: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        context: &mut ReconcileContext,
        outcome: &mut PhaseOutcome,
    ) -> DeployResult<()>;
}
