//! Core data types shared by the scanner, the planner and the reconciler

mod kind;
mod record;

pub use kind::ArtifactKind;
pub use record::DeploymentRecord;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One item discovered in the source tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDescriptor {
    pub kind: ArtifactKind,
    pub display_name: String,
    pub description: Option<String>,
    /// Design-time token embedded in exported definitions that reference this item
    pub logical_id: Option<String>,
    /// Item folder (`<name>.<Kind>`)
    pub folder: PathBuf,
    /// Every file making up the item definition, sorted
    pub source_paths: Vec<PathBuf>,
}

impl ArtifactDescriptor {
    /// Primary definition file, when the kind has one and it exists
    pub fn content_path(&self) -> Option<PathBuf> {
        let file = self.kind.content_file()?;
        let path = self.folder.join(file);
        self.source_paths.contains(&path).then_some(path)
    }
}

/// One item as reported by the remote workspace listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Workspace summary returned by lookups and listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub id: String,
    pub display_name: String,
}
