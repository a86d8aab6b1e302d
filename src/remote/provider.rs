//! Collaborator traits for the remote item store
//!
//! The engine only talks to the service through these traits. `FabricClient`
//! implements them over HTTP; `InMemoryFabric` implements them for tests.

use crate::error::DeployResult;
use crate::model::{ArtifactKind, DeployedItem, WorkspaceInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateWorkspaceOutcome {
    Created(WorkspaceInfo),
    /// A workspace with that name already exists
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    pub kind: ArtifactKind,
    pub display_name: String,
    pub description: Option<String>,
}

/// One file of an item definition; `payload` is the decoded text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionPart {
    pub path: String,
    pub payload: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemDefinition {
    pub parts: Vec<DefinitionPart>,
}

impl ItemDefinition {
    pub fn new(parts: Vec<DefinitionPart>) -> Self {
        Self { parts }
    }

    pub fn part(&self, path: &str) -> Option<&DefinitionPart> {
        self.parts.iter().find(|p| p.path == path)
    }

    /// The part whose path ends with `file_name`
    pub fn part_named(&self, file_name: &str) -> Option<&DefinitionPart> {
        self.parts
            .iter()
            .find(|p| p.path.rsplit('/').next() == Some(file_name))
    }
}

/// Long-running operation started by an accepted create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub id: String,
    /// Server hint for the first poll
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateItemOutcome {
    Created(String),
    Accepted(OperationHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Running,
    /// `item_id` is absent when the operation result could not be read
    Succeeded { item_id: Option<String> },
    Failed { status: String, message: String },
}

/// Workspace membership entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub identifier: String,
    pub principal_type: String,
    pub access: String,
}

#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    async fn create_workspace(
        &self,
        name: &str,
        capacity_id: Option<&str>,
    ) -> DeployResult<CreateWorkspaceOutcome>;

    async fn get_workspace_by_name(&self, name: &str) -> DeployResult<Option<WorkspaceInfo>>;

    async fn list_workspaces(&self) -> DeployResult<Vec<WorkspaceInfo>>;

    async fn delete_workspace(&self, workspace_id: &str) -> DeployResult<()>;

    async fn list_items(&self, workspace_id: &str) -> DeployResult<Vec<DeployedItem>>;

    async fn create_item(
        &self,
        workspace_id: &str,
        metadata: &ItemMetadata,
        definition: Option<&ItemDefinition>,
    ) -> DeployResult<CreateItemOutcome>;

    async fn update_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
        definition: &ItemDefinition,
    ) -> DeployResult<()>;

    async fn delete_item(&self, workspace_id: &str, item_id: &str) -> DeployResult<()>;

    async fn poll_operation(&self, operation_id: &str) -> DeployResult<OperationState>;

    async fn get_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
    ) -> DeployResult<ItemDefinition>;

    /// Query endpoint of an eventhouse, `None` if the service has not published it yet
    async fn eventhouse_query_uri(
        &self,
        workspace_id: &str,
        eventhouse_id: &str,
    ) -> DeployResult<Option<String>>;
}

#[async_trait]
pub trait AccessProvider: Send + Sync {
    async fn list_members(&self, workspace_id: &str) -> DeployResult<Vec<Member>>;

    async fn add_member(&self, workspace_id: &str, member: &Member) -> DeployResult<()>;

    async fn update_member_role(&self, workspace_id: &str, member: &Member) -> DeployResult<()>;

    async fn remove_member(&self, workspace_id: &str, identifier: &str) -> DeployResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve_connection_id(&self, display_name: &str) -> DeployResult<Option<String>>;
}
