// Reconciliation phases, in the order the orchestrator runs them.
//
// Each phase owns one item kind. The teardown phase only runs against
// workspaces that already existed.

pub mod item_helper;

#[path = "01_lakehouses.rs"]
pub mod lakehouses;
#[path = "02_eventhouses.rs"]
pub mod eventhouses;
#[path = "03_notebooks.rs"]
pub mod notebooks;
#[path = "04_teardown.rs"]
pub mod teardown;
#[path = "05_data_pipelines.rs"]
pub mod data_pipelines;
#[path = "06_environment.rs"]
pub mod environment;
