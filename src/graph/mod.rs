//! Pipeline dependency graph and ordering

mod references;
mod sort;

pub use references::{
    raw_references, referenced_pipelines, walk_activities, ActivityVisitor, PipelineActivity,
};
pub use sort::DependencyGraph;

use crate::catalog::{Catalog, LookupMode};
use crate::error::{DeployError, DeployResult};
use crate::fs::FileSystem;
use crate::model::ArtifactKind;
use serde_json::Value;

/// Builds the graph of every repository pipeline from its definition file
pub fn repository_graph(catalog: &Catalog, fs: &dyn FileSystem) -> DeployResult<DependencyGraph> {
    let kind = ArtifactKind::DataPipeline;
    let mut graph = DependencyGraph::new();

    for entry in catalog.entries(&kind) {
        let Some(path) = entry.content_path(&kind) else {
            graph.add(entry.display_name.clone(), Vec::new());
            continue;
        };
        let raw = fs
            .read_to_string(&path)
            .map_err(|e| DeployError::filesystem(&path, e))?;
        let definition: Value = serde_json::from_str(&raw)
            .map_err(|e| DeployError::json(path.display().to_string(), e))?;

        graph.add(
            entry.display_name.clone(),
            referenced_pipelines(&definition, catalog, LookupMode::Repository),
        );
    }

    Ok(graph)
}

/// Order in which the repository pipelines must be published
pub fn publish_order(catalog: &Catalog, fs: &dyn FileSystem) -> DeployResult<Vec<String>> {
    repository_graph(catalog, fs)?.topological_order()
}

/// Builds the graph of deployed pipelines from their fetched definitions
pub fn deployed_graph(catalog: &Catalog, definitions: &[(String, Value)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for (name, definition) in definitions {
        graph.add(
            name.clone(),
            referenced_pipelines(definition, catalog, LookupMode::Deployed),
        );
    }
    graph
}
