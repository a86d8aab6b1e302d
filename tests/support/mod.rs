//! Shared fixtures for integration tests
//!
//! `RepoFixture` writes a repository layer (`ARM/<layer>/<name>.<Kind>/`) into
//! a temporary directory, the same shape exported workspaces have on disk.

#![allow(dead_code)]

use fabric_deploy::config::DeployConfig;
use fabric_deploy::fs::RealFileSystem;
use fabric_deploy::lifecycle::WorkspaceLifecycle;
use fabric_deploy::pipeline::Services;
use fabric_deploy::remote::{InMemoryFabric, PollPolicy};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct RepoFixture {
    dir: TempDir,
    layer: String,
}

impl RepoFixture {
    pub fn new(layer: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("ARM").join(layer)).expect("Failed to create layer");
        Self {
            dir,
            layer: layer.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    fn item_dir(&self, name: &str, kind: &str) -> PathBuf {
        let path = self
            .dir
            .path()
            .join("ARM")
            .join(&self.layer)
            .join(format!("{}.{}", name, kind));
        fs::create_dir_all(&path).expect("Failed to create item folder");
        path
    }

    fn platform(&self, name: &str, kind: &str, logical_id: Option<&str>) -> PathBuf {
        let dir = self.item_dir(name, kind);
        let mut platform = json!({"metadata": {"type": kind, "displayName": name}});
        if let Some(id) = logical_id {
            platform["config"] = json!({"logicalId": id});
        }
        fs::write(dir.join(".platform"), platform.to_string()).expect("Failed to write .platform");
        dir
    }

    pub fn lakehouse(&self, name: &str, logical_id: &str) -> &Self {
        let dir = self.platform(name, "Lakehouse", Some(logical_id));
        fs::write(dir.join("lakehouse.metadata.json"), "{}").expect("Failed to write lakehouse");
        self
    }

    pub fn eventhouse(&self, name: &str) -> &Self {
        let dir = self.platform(name, "Eventhouse", None);
        fs::write(dir.join("EventhouseProperties.json"), "{}")
            .expect("Failed to write eventhouse");
        self
    }

    pub fn notebook(&self, name: &str, lakehouse: &str) -> &Self {
        let dir = self.platform(name, "Notebook", None);
        fs::write(dir.join("notebook-content.py"), notebook_source(lakehouse))
            .expect("Failed to write notebook");
        self
    }

    /// Pipeline invoking each of `invokes` (logical ids) plus `extra` properties
    pub fn pipeline(&self, name: &str, logical_id: &str, invokes: &[&str], extra: Value) -> &Self {
        let dir = self.platform(name, "DataPipeline", Some(logical_id));
        let activities: Vec<Value> = invokes
            .iter()
            .map(|id| {
                json!({
                    "name": format!("Invoke {}", id),
                    "type": "InvokePipeline",
                    "typeProperties": {"pipelineId": id, "workspaceId": "00000000-0000-0000-0000-000000000000"}
                })
            })
            .collect();
        let mut content = json!({"properties": {"activities": activities}});
        if let (Some(props), Value::Object(extra)) = (content["properties"].as_object_mut(), extra) {
            props.extend(extra);
        }
        fs::write(
            dir.join("pipeline-content.json"),
            serde_json::to_string_pretty(&content).expect("Failed to serialize pipeline"),
        )
        .expect("Failed to write pipeline");
        self
    }

    pub fn remove(&self, name: &str, kind: &str) {
        fs::remove_dir_all(self.item_dir(name, kind)).expect("Failed to remove item");
    }

    pub fn config(&self, workspace: &str) -> DeployConfig {
        DeployConfig {
            workspace_name: workspace.to_string(),
            artifact_root: self.root().to_path_buf(),
            layer: self.layer.clone(),
            poll: PollPolicy::immediate(),
            lookup_delay: Duration::ZERO,
            ..DeployConfig::default()
        }
    }
}

pub fn notebook_source(lakehouse: &str) -> String {
    format!(
        "# Fabric notebook source\n\n\
         # META {{\n\
         # META   \"dependencies\": {{\n\
         # META     \"lakehouse\": {{\n\
         # META       \"default_lakehouse\": \"design-id\",\n\
         # META       \"default_lakehouse_name\": \"{}\",\n\
         # META       \"default_lakehouse_workspace_id\": \"design-ws\",\n\
         # META       \"known_lakehouses\": [ {{ \"id\": \"design-id\" }} ]\n\
         # META     }}\n\
         # META   }}\n\
         # META }}\n\n\
         df = spark.read.table(\"sales\")\n",
        lakehouse
    )
}

pub fn lifecycle(fabric: &Arc<InMemoryFabric>, config: DeployConfig) -> WorkspaceLifecycle {
    let services = Services::new(fabric.clone(), fabric.clone(), Arc::new(RealFileSystem::new()));
    WorkspaceLifecycle::new(config, services, fabric.clone())
}
