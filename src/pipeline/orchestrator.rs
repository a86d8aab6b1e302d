use super::context::{ReconcileContext, ReconcileMode};
use super::phase_trait::{PhaseOutcome, ReconcilePhase};
use super::phases::{
    data_pipelines::DataPipelinePhase, environment::EnvironmentPhase,
    eventhouses::EventhousePhase, lakehouses::LakehousePhase, notebooks::NotebookPhase,
    teardown::TeardownPhase,
};
use crate::error::{DeployError, DeployResult};
use crate::model::DeploymentRecord;
use crate::progress::ProgressEvent;
use std::time::Instant;
use tracing::{debug, error, info};

/// Runs the phases in their fixed order and collects the ledger
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileOrchestrator;

impl ReconcileOrchestrator {
    pub fn new() -> Self {
        Self
    }

    pub fn phases(mode: ReconcileMode) -> Vec<Box<dyn ReconcilePhase>> {
        let mut phases: Vec<Box<dyn ReconcilePhase>> = vec![
            Box::new(LakehousePhase),
            Box::new(EventhousePhase),
            Box::new(NotebookPhase),
        ];
        if mode == ReconcileMode::Incremental {
            phases.push(Box::new(TeardownPhase));
        }
        phases.push(Box::new(DataPipelinePhase));
        phases.push(Box::new(EnvironmentPhase));
        phases
    }

    /// Any phase error stops the run; it comes back as `PartialApply` with
    /// every record applied up to that point
    pub async fn execute(
        &self,
        context: &mut ReconcileContext,
    ) -> DeployResult<Vec<DeploymentRecord>> {
        let start = Instant::now();
        info!(
            workspace = %context.workspace.display_name,
            mode = ?context.mode,
            items = context.repository.len(),
            "Starting reconciliation"
        );

        let mut ledger = Vec::new();
        for phase in Self::phases(context.mode) {
            let phase_name = phase.name();
            info!("Phase: {}", phase_name);
            context.emit(ProgressEvent::PhaseStarted {
                phase: phase_name.to_string(),
            });

            let phase_start = Instant::now();
            let mut outcome = PhaseOutcome::default();
            let result = phase.execute(context, &mut outcome).await;
            let applied = outcome.records.len();
            ledger.extend(outcome.records);

            if let Err(e) = result {
                error!(phase = %phase_name, applied = ledger.len(), "Phase failed");
                return Err(DeployError::PartialApply {
                    phase: phase_name.to_string(),
                    applied: ledger,
                    source: Box::new(e),
                });
            }

            context.emit(ProgressEvent::PhaseComplete {
                phase: phase_name.to_string(),
                records: applied,
                duration: phase_start.elapsed(),
            });
            debug!("Phase {} complete", phase_name);
        }

        info!(
            records = ledger.len(),
            duration_ms = start.elapsed().as_millis(),
            "Reconciliation complete"
        );
        Ok(ledger)
    }
}
