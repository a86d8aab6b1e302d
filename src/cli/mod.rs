pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, DeployArgs, PlanArgs};
pub use output::{OutputFormat, OutputFormatter};
