pub mod config;
pub mod context;
pub mod orchestrator;
pub mod phase_trait;
pub mod phases;

pub use config::{ForcedLakehouse, ReconcileSettings};
pub use context::{ReconcileContext, ReconcileMode, Services};
pub use orchestrator::ReconcileOrchestrator;
pub use phase_trait::{PhaseOutcome, ReconcilePhase};
