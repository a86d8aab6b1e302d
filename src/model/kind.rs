use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a workspace item
///
/// The first five variants are deployable from the source tree. Other remote
/// kinds (KQL databases created alongside an eventhouse, semantic models, ...)
/// still appear in workspace listings and are kept so they can be looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArtifactKind {
    Lakehouse,
    Notebook,
    DataPipeline,
    Eventhouse,
    Environment,
    KqlDatabase,
    Other(String),
}

impl ArtifactKind {
    pub const DEPLOYABLE: [ArtifactKind; 5] = [
        ArtifactKind::Lakehouse,
        ArtifactKind::Notebook,
        ArtifactKind::DataPipeline,
        ArtifactKind::Eventhouse,
        ArtifactKind::Environment,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ArtifactKind::Lakehouse => "Lakehouse",
            ArtifactKind::Notebook => "Notebook",
            ArtifactKind::DataPipeline => "DataPipeline",
            ArtifactKind::Eventhouse => "Eventhouse",
            ArtifactKind::Environment => "Environment",
            ArtifactKind::KqlDatabase => "KQLDatabase",
            ArtifactKind::Other(name) => name,
        }
    }

    /// Suffix of the source folder holding one item of this kind
    pub fn folder_marker(&self) -> Option<&'static str> {
        match self {
            ArtifactKind::Lakehouse => Some(".Lakehouse"),
            ArtifactKind::Notebook => Some(".Notebook"),
            ArtifactKind::DataPipeline => Some(".DataPipeline"),
            ArtifactKind::Eventhouse => Some(".Eventhouse"),
            ArtifactKind::Environment => Some(".Environment"),
            _ => None,
        }
    }

    /// Primary definition file expected inside the item folder
    pub fn content_file(&self) -> Option<&'static str> {
        match self {
            ArtifactKind::Lakehouse => Some("lakehouse.metadata.json"),
            ArtifactKind::Notebook => Some("notebook-content.py"),
            ArtifactKind::DataPipeline => Some("pipeline-content.json"),
            ArtifactKind::Eventhouse => Some("EventhouseProperties.json"),
            _ => None,
        }
    }

    pub fn is_deployable(&self) -> bool {
        self.folder_marker().is_some()
    }

    /// Resolves a folder name like `Load Sales.DataPipeline` to its kind
    pub fn from_folder_name(name: &str) -> Option<ArtifactKind> {
        Self::DEPLOYABLE.into_iter().find(|kind| {
            kind.folder_marker()
                .is_some_and(|marker| name.len() > marker.len() && name.ends_with(marker))
        })
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ArtifactKind {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "lakehouse" => ArtifactKind::Lakehouse,
            "notebook" => ArtifactKind::Notebook,
            "datapipeline" => ArtifactKind::DataPipeline,
            "eventhouse" => ArtifactKind::Eventhouse,
            "environment" => ArtifactKind::Environment,
            "kqldatabase" => ArtifactKind::KqlDatabase,
            _ => ArtifactKind::Other(value.trim().to_string()),
        }
    }
}

impl From<String> for ArtifactKind {
    fn from(value: String) -> Self {
        ArtifactKind::from(value.as_str())
    }
}

impl From<ArtifactKind> for String {
    fn from(kind: ArtifactKind) -> Self {
        kind.as_str().to_string()
    }
}
