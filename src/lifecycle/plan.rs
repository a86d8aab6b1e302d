use crate::catalog::RepositoryScanner;
use crate::error::DeployResult;
use crate::fs::FileSystem;
use crate::graph::publish_order;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedItem {
    pub kind: String,
    pub name: String,
    pub logical_id: Option<String>,
    pub files: usize,
}

/// What a deployment of one layer would publish, computed without any remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    pub layer: String,
    pub items: Vec<PlannedItem>,
    pub pipeline_order: Vec<String>,
}

impl DeploymentPlan {
    /// Fails on the same scan errors and pipeline cycles a deployment would hit
    pub fn build(fs: Arc<dyn FileSystem>, layer_root: &Path, layer: &str) -> DeployResult<Self> {
        let catalog = RepositoryScanner::new(fs.clone()).scan(layer_root, layer)?;
        let pipeline_order = publish_order(&catalog, fs.as_ref())?;

        let items = catalog
            .iter()
            .map(|(kind, entry)| PlannedItem {
                kind: kind.to_string(),
                name: entry.display_name.clone(),
                logical_id: entry.logical_id.clone(),
                files: entry.source_paths.len(),
            })
            .collect();

        Ok(Self {
            layer: layer.to_string(),
            items,
            pipeline_order,
        })
    }
}
