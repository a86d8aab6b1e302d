//! Workspace lifecycle: existence check, provisioning, reconciliation and
//! compensation on failure

mod manager;
mod plan;

pub use manager::{DeploymentReport, LifecycleState, WorkspaceLifecycle};
pub use plan::{DeploymentPlan, PlannedItem};
