//! Output formatting for multiple formats
//!
//! Deployment reports and offline plans render as JSON, YAML or
//! human-readable text.
//!
//! # Example
//!
//! ```ignore
//! use fabric_deploy::cli::output::{OutputFormat, OutputFormatter};
//!
//! let formatter = OutputFormatter::new(OutputFormat::Json);
//! let output = formatter.format_report(&report)?;
//! println!("{}", output);
//! ```

use anyhow::{Context, Result};

use crate::lifecycle::{DeploymentPlan, DeploymentReport};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (version-control friendly)
    Yaml,
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

fn branch(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "\u{2514}\u{2500}"
    } else {
        "\u{251C}\u{2500}"
    }
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_report(&self, report: &DeploymentReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize deployment report to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(report)
                .context("Failed to serialize deployment report to YAML"),
            OutputFormat::Human => Ok(self.format_report_human(report)),
        }
    }

    pub fn format_plan(&self, plan: &DeploymentPlan) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(plan).context("Failed to serialize plan to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(plan).context("Failed to serialize plan to YAML")
            }
            OutputFormat::Human => Ok(self.format_plan_human(plan)),
        }
    }

    fn format_report_human(&self, report: &DeploymentReport) -> String {
        let mut output = String::new();

        output.push_str("\u{2713} Deployment Complete\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        let action = if report.created { "created" } else { "updated" };
        output.push_str(&format!(
            "Workspace:  {} ({}, {})\n\n",
            report.workspace.display_name, report.workspace.id, action
        ));

        if let Some(plan) = &report.membership {
            output.push_str("Membership:\n");
            output.push_str(&format!("\u{251C}\u{2500} Added:    {}\n", plan.add.len()));
            output.push_str(&format!("\u{251C}\u{2500} Updated:  {}\n", plan.update.len()));
            output.push_str(&format!("\u{2514}\u{2500} Removed:  {}\n\n", plan.remove.len()));
        }

        let items: Vec<_> = report
            .records
            .iter()
            .filter(|r| r.artifact_location_guid.is_some())
            .collect();
        if items.is_empty() {
            output.push_str("Items: (no changes)\n");
        } else {
            output.push_str(&format!("Items ({}):\n", items.len()));
            for (i, record) in items.iter().enumerate() {
                output.push_str(&format!(
                    "{} {:<13} {}  {}\n",
                    branch(i, items.len()),
                    record.artifact_type,
                    record.artifact_name,
                    record.artifact_guid
                ));
            }
        }

        output
    }

    fn format_plan_human(&self, plan: &DeploymentPlan) -> String {
        let mut output = String::new();

        output.push_str(&format!("Deployment Plan: {}\n", plan.layer));
        output.push_str(RULE);
        output.push_str("\n\n");

        if plan.items.is_empty() {
            output.push_str("Items: (none found)\n");
            return output;
        }

        output.push_str(&format!("Items ({}):\n", plan.items.len()));
        for (i, item) in plan.items.iter().enumerate() {
            output.push_str(&format!(
                "{} {:<13} {}  ({} file(s))\n",
                branch(i, plan.items.len()),
                item.kind,
                item.name,
                item.files
            ));
        }

        if !plan.pipeline_order.is_empty() {
            output.push_str("\nPipeline publish order:\n");
            for (i, name) in plan.pipeline_order.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, name));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::PlannedItem;
    use crate::model::{ArtifactKind, DeploymentRecord, WorkspaceInfo};

    fn report() -> DeploymentReport {
        DeploymentReport {
            workspace: WorkspaceInfo {
                id: "ws-1".to_string(),
                display_name: "Sales".to_string(),
            },
            created: true,
            membership: None,
            records: vec![
                DeploymentRecord::workspace("ws-1", "Sales"),
                DeploymentRecord::item(&ArtifactKind::Notebook, "Load", "ws-1", "Sales", "nb-1"),
            ],
        }
    }

    fn plan() -> DeploymentPlan {
        DeploymentPlan {
            layer: "Operations".to_string(),
            items: vec![PlannedItem {
                kind: "DataPipeline".to_string(),
                name: "Run".to_string(),
                logical_id: Some("L1".to_string()),
                files: 2,
            }],
            pipeline_order: vec!["Run".to_string()],
        }
    }

    #[test]
    fn test_report_json() {
        let output = OutputFormatter::new(OutputFormat::Json)
            .format_report(&report())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["records"][1]["artifact_guid"], "nb-1");
        assert_eq!(value["created"], true);
    }

    #[test]
    fn test_report_yaml() {
        let output = OutputFormatter::new(OutputFormat::Yaml)
            .format_report(&report())
            .unwrap();
        assert!(output.contains("artifact_type: Workspace"));
    }

    #[test]
    fn test_report_human_lists_items_only() {
        let output = OutputFormatter::new(OutputFormat::Human)
            .format_report(&report())
            .unwrap();
        assert!(output.contains("Deployment Complete"));
        assert!(output.contains("Items (1):"));
        assert!(output.contains("nb-1"));
    }

    #[test]
    fn test_plan_human() {
        let output = OutputFormatter::new(OutputFormat::Human)
            .format_plan(&plan())
            .unwrap();
        assert!(output.contains("Deployment Plan: Operations"));
        assert!(output.contains("1. Run"));
    }

    #[test]
    fn test_plan_json() {
        let output = OutputFormatter::new(OutputFormat::Json)
            .format_plan(&plan())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["pipeline_order"][0], "Run");
    }
}
