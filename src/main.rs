use fabric_deploy::cli::commands::{CliArgs, Commands};
use fabric_deploy::cli::handlers::{handle_deploy, handle_plan};
use fabric_deploy::util::logging::{self, LoggingConfig};
use fabric_deploy::VERSION;

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("fabric-deploy v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Deploy(deploy_args) => handle_deploy(deploy_args).await,
        Commands::Plan(plan_args) => handle_plan(plan_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let from_env = logging::config_from_env();

    let level = if let Some(level_str) = &args.log_level {
        logging::parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        from_env.level
    };

    logging::init_logging(LoggingConfig { level, ..from_env });
}
