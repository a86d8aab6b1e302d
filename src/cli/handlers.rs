use super::commands::{DeployArgs, PlanArgs};
use super::output::{OutputFormat, OutputFormatter};
use crate::config::DeployConfig;
use crate::error::{error_chain, DeployError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::lifecycle::{DeploymentPlan, WorkspaceLifecycle};
use crate::pipeline::Services;
use crate::progress::LoggingHandler;
use crate::remote::{ClientCredentials, FabricClient, TokenBucket, TokenSource};
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

const TENANT_VAR: &str = "FABRIC_DEPLOY_TENANT_ID";
const CLIENT_VAR: &str = "FABRIC_DEPLOY_CLIENT_ID";
const SECRET_VAR: &str = "FABRIC_DEPLOY_CLIENT_SECRET";
const SPN_VAR: &str = "spn";

/// Credentials come from the three `FABRIC_DEPLOY_*` variables, or failing
/// that from the `spn` JSON document
pub fn credentials_from_env() -> Result<ClientCredentials> {
    let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
    if let (Some(tenant_id), Some(client_id)) = (read(TENANT_VAR), read(CLIENT_VAR)) {
        return Ok(ClientCredentials {
            tenant_id,
            client_id,
            client_secret: read(SECRET_VAR).unwrap_or_default(),
        });
    }
    let raw = read(SPN_VAR).with_context(|| {
        format!(
            "No credentials: set {}, {} and {}, or {}",
            TENANT_VAR, CLIENT_VAR, SECRET_VAR, SPN_VAR
        )
    })?;
    Ok(ClientCredentials::from_json(&raw)?)
}

fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!("Output written to {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

fn report_failure(err: &DeployError) {
    error!("Deployment failed: {}", error_chain(err));
    eprintln!("Error: {}", error_chain(err));
    let applied = err.applied_records();
    if !applied.is_empty() {
        eprintln!("Applied before the failure:");
        for record in applied {
            eprintln!(
                "  {} {} {}",
                record.artifact_type, record.artifact_name, record.artifact_guid
            );
        }
    }
}

fn build_services(config: &DeployConfig) -> Result<(Services, Arc<FabricClient>)> {
    let credentials = credentials_from_env()?;
    let tokens = Arc::new(TokenSource::new(credentials, reqwest::Client::new()));
    let client = Arc::new(FabricClient::new(tokens)?.with_poll_policy(config.poll.clone()));
    let file_system: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new());

    let services = Services::new(client.clone(), client.clone(), file_system)
        .with_limiter(Arc::new(TokenBucket::new(
            config.rate_limit,
            config.rate_window,
        )))
        .with_progress(Arc::new(LoggingHandler));
    Ok((services, client))
}

pub async fn handle_deploy(args: &DeployArgs) -> i32 {
    let mut config = match DeployConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Err(e) = args.apply(&mut config).and_then(|()| config.validate()) {
        eprintln!("Error: {}", e);
        return 1;
    }
    debug!("Deploy configuration: {:?}", config);

    let (services, client) = match build_services(&config) {
        Ok(built) => built,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return 1;
        }
    };

    let lifecycle = WorkspaceLifecycle::new(config, services, client);
    let report = match lifecycle.run().await {
        Ok(report) => report,
        Err(e) => {
            report_failure(&e);
            return 1;
        }
    };

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    let rendered = match formatter.format_report(&report) {
        Ok(rendered) => rendered,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return 1;
        }
    };
    match write_output(&rendered, args.output.as_deref()) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

pub async fn handle_plan(args: &PlanArgs) -> i32 {
    let artifact_root = args
        .artifact_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let file_system: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new());

    let plan = match DeploymentPlan::build(file_system, &artifact_root.join("ARM"), &args.layer) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Error: {}", error_chain(&e));
            return 1;
        }
    };

    let result = OutputFormatter::new(OutputFormat::from(args.format))
        .format_plan(&plan)
        .and_then(|rendered| write_output(&rendered, args.output.as_deref()));
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::OutputFormatArg;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_credentials() {
        for name in [TENANT_VAR, CLIENT_VAR, SECRET_VAR, SPN_VAR] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_credentials_from_split_variables() {
        clear_credentials();
        env::set_var(TENANT_VAR, "tenant");
        env::set_var(CLIENT_VAR, "client");
        env::set_var(SECRET_VAR, "secret");

        let creds = credentials_from_env().unwrap();
        assert_eq!(creds.tenant_id, "tenant");
        assert_eq!(creds.client_secret, "secret");
        clear_credentials();
    }

    #[test]
    #[serial]
    fn test_credentials_from_spn_document() {
        clear_credentials();
        env::set_var(
            SPN_VAR,
            "{'tenant_id': 't', 'client_id': 'c', 'client_secret': 's'}",
        );

        let creds = credentials_from_env().unwrap();
        assert_eq!(creds.client_id, "c");
        clear_credentials();
    }

    #[test]
    #[serial]
    fn test_missing_credentials() {
        clear_credentials();
        let err = credentials_from_env().unwrap_err();
        assert!(err.to_string().contains("No credentials"));
    }

    #[tokio::test]
    async fn test_plan_writes_output_file() {
        let dir = TempDir::new().unwrap();
        let item = dir.path().join("ARM/Operations/Bronze.Lakehouse");
        fs::create_dir_all(&item).unwrap();
        fs::write(
            item.join(".platform"),
            r#"{"metadata": {"type": "Lakehouse", "displayName": "Bronze"}}"#,
        )
        .unwrap();
        fs::write(item.join("lakehouse.metadata.json"), "{}").unwrap();
        let output = dir.path().join("plan.json");

        let args = PlanArgs {
            artifact_root: Some(dir.path().to_path_buf()),
            layer: "Operations".to_string(),
            format: OutputFormatArg::Json,
            output: Some(output.clone()),
        };

        assert_eq!(handle_plan(&args).await, 0);
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(written["items"][0]["name"], "Bronze");
    }
}
