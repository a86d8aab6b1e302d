use super::ArtifactKind;
use serde::{Deserialize, Serialize};

/// Audit entry for one applied change
///
/// The first record of a run describes the workspace itself and carries no
/// location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub artifact_type: String,
    pub artifact_name: String,
    pub artifact_location_guid: Option<String>,
    pub artifact_location_name: Option<String>,
    pub artifact_guid: String,
}

impl DeploymentRecord {
    pub fn workspace(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            artifact_type: "Workspace".to_string(),
            artifact_name: name.into(),
            artifact_location_guid: None,
            artifact_location_name: None,
            artifact_guid: id.into(),
        }
    }

    pub fn item(
        kind: &ArtifactKind,
        name: impl Into<String>,
        workspace_id: impl Into<String>,
        workspace_name: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            artifact_type: kind.to_string(),
            artifact_name: name.into(),
            artifact_location_guid: Some(workspace_id.into()),
            artifact_location_name: Some(workspace_name.into()),
            artifact_guid: id.into(),
        }
    }
}
