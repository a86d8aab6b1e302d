//! Stateful in-memory implementation of the remote traits
//!
//! Used by tests to run full reconciliations without a service. Every call is
//! recorded, and failures, accepted (asynchronous) creates, name conflicts and
//! slow deletions can be injected.

use super::provider::{
    AccessProvider, ConnectionResolver, CreateItemOutcome, CreateWorkspaceOutcome,
    ItemDefinition, ItemMetadata, Member, OperationHandle, OperationState, WorkspaceProvider,
};
use crate::error::{DeployError, DeployResult};
use crate::model::{ArtifactKind, DeployedItem, WorkspaceInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateWorkspace(String),
    GetWorkspaceByName(String),
    ListWorkspaces,
    DeleteWorkspace(String),
    ListItems(String),
    CreateItem { kind: ArtifactKind, name: String },
    UpdateDefinition { item_id: String },
    DeleteItem { item_id: String },
    PollOperation(String),
    GetDefinition { item_id: String },
    EventhouseQueryUri(String),
    ListMembers(String),
    AddMember(String),
    UpdateMember(String),
    RemoveMember(String),
    ResolveConnection(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateWorkspace,
    GetWorkspaceByName,
    ListWorkspaces,
    DeleteWorkspace,
    ListItems,
    CreateItem,
    UpdateDefinition,
    DeleteItem,
    /// Accepted operations end in the `Failed` state
    Operation,
    ListMembers,
    AddMember,
}

#[derive(Debug, Clone)]
struct StoredItem {
    item: DeployedItem,
    definition: Option<ItemDefinition>,
}

#[derive(Debug, Clone)]
struct PendingOperation {
    item_id: String,
    polls_left: u32,
}

#[derive(Debug, Default)]
struct State {
    workspaces: Vec<WorkspaceInfo>,
    items: HashMap<String, Vec<StoredItem>>,
    lingering: HashMap<String, Vec<(DeployedItem, u32)>>,
    members: HashMap<String, Vec<Member>>,
    connections: HashMap<String, String>,
    operations: HashMap<String, PendingOperation>,
    calls: Vec<Call>,
    failures: HashMap<FailPoint, u32>,
    failing_items: Vec<String>,
    conflict_on_create: bool,
    accept_polls: Option<u32>,
    lose_results: bool,
    hidden_lookups: u32,
    linger_lists: u32,
}

impl State {
    fn should_fail(&mut self, point: FailPoint) -> bool {
        match self.failures.get_mut(&point) {
            Some(0) | None => false,
            Some(remaining) => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
        }
    }

    fn fail(&mut self, point: FailPoint, operation: &str) -> DeployResult<()> {
        if self.should_fail(point) {
            return Err(DeployError::RemoteFailure {
                operation: operation.to_string(),
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn items_mut(&mut self, workspace_id: &str) -> DeployResult<&mut Vec<StoredItem>> {
        self.items
            .get_mut(workspace_id)
            .ok_or_else(|| DeployError::RemoteFailure {
                operation: "workspace lookup".to_string(),
                status: 404,
                message: format!("workspace {} not found", workspace_id),
            })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFabric {
    state: Mutex<State>,
}

impl InMemoryFabric {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn seed_workspace(&self, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let mut state = self.state();
        state.workspaces.push(WorkspaceInfo {
            id: id.clone(),
            display_name: name.to_string(),
        });
        state.items.insert(id.clone(), Vec::new());
        id
    }

    pub fn seed_item(&self, workspace_id: &str, kind: ArtifactKind, name: &str) -> String {
        self.insert_item(workspace_id, kind, name, None, None)
    }

    pub fn seed_item_with_definition(
        &self,
        workspace_id: &str,
        kind: ArtifactKind,
        name: &str,
        definition: ItemDefinition,
    ) -> String {
        self.insert_item(workspace_id, kind, name, None, Some(definition))
    }

    fn insert_item(
        &self,
        workspace_id: &str,
        kind: ArtifactKind,
        name: &str,
        description: Option<String>,
        definition: Option<ItemDefinition>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        self.state()
            .items
            .entry(workspace_id.to_string())
            .or_default()
            .push(StoredItem {
                item: DeployedItem {
                    id: id.clone(),
                    kind,
                    display_name: name.to_string(),
                    description,
                },
                definition,
            });
        id
    }

    pub fn seed_member(&self, workspace_id: &str, member: Member) {
        self.state()
            .members
            .entry(workspace_id.to_string())
            .or_default()
            .push(member);
    }

    pub fn seed_connection(&self, display_name: &str, id: &str) {
        self.state()
            .connections
            .insert(display_name.to_string(), id.to_string());
    }

    /// The next `times` calls at `point` fail (`u32::MAX` for always)
    pub fn fail_times(&self, point: FailPoint, times: u32) {
        self.state().failures.insert(point, times);
    }

    /// Creating or updating an item with this display name fails
    pub fn fail_item(&self, name: &str) {
        self.state().failing_items.push(name.to_string());
    }

    /// `create_workspace` answers with a name conflict
    pub fn conflict_on_create(&self) {
        self.state().conflict_on_create = true;
    }

    /// Item creation is accepted; each operation reports `Running` `polls` times first
    pub fn accept_creates(&self, polls: u32) {
        self.state().accept_polls = Some(polls);
    }

    /// Succeeded operations do not report the created item id
    pub fn lose_operation_results(&self) {
        self.state().lose_results = true;
    }

    /// The next `times` lookups, by name or by listing, do not see any workspace
    pub fn hide_workspace_lookups(&self, times: u32) {
        self.state().hidden_lookups = times;
    }

    /// Deleted items stay visible for `lists` further listings
    pub fn linger_deleted(&self, lists: u32) {
        self.state().linger_lists = lists;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn count_polls(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::PollOperation(_)))
    }

    pub fn workspaces(&self) -> Vec<WorkspaceInfo> {
        self.state().workspaces.clone()
    }

    pub fn items(&self, workspace_id: &str) -> Vec<DeployedItem> {
        self.state()
            .items
            .get(workspace_id)
            .map(|items| items.iter().map(|s| s.item.clone()).collect())
            .unwrap_or_default()
    }

    pub fn item_id(&self, workspace_id: &str, kind: &ArtifactKind, name: &str) -> Option<String> {
        self.items(workspace_id)
            .into_iter()
            .find(|i| &i.kind == kind && i.display_name == name)
            .map(|i| i.id)
    }

    pub fn definition(
        &self,
        workspace_id: &str,
        kind: &ArtifactKind,
        name: &str,
    ) -> Option<ItemDefinition> {
        self.state().items.get(workspace_id).and_then(|items| {
            items
                .iter()
                .find(|s| &s.item.kind == kind && s.item.display_name == name)
                .and_then(|s| s.definition.clone())
        })
    }

    pub fn members(&self, workspace_id: &str) -> Vec<Member> {
        self.state()
            .members
            .get(workspace_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl WorkspaceProvider for InMemoryFabric {
    async fn create_workspace(
        &self,
        name: &str,
        _capacity_id: Option<&str>,
    ) -> DeployResult<CreateWorkspaceOutcome> {
        let mut state = self.state();
        state.calls.push(Call::CreateWorkspace(name.to_string()));
        state.fail(FailPoint::CreateWorkspace, "create workspace")?;

        if state.conflict_on_create || state.workspaces.iter().any(|w| w.display_name == name) {
            return Ok(CreateWorkspaceOutcome::Conflict);
        }

        let info = WorkspaceInfo {
            id: Uuid::new_v4().to_string(),
            display_name: name.to_string(),
        };
        state.workspaces.push(info.clone());
        state.items.insert(info.id.clone(), Vec::new());
        Ok(CreateWorkspaceOutcome::Created(info))
    }

    async fn get_workspace_by_name(&self, name: &str) -> DeployResult<Option<WorkspaceInfo>> {
        let mut state = self.state();
        state.calls.push(Call::GetWorkspaceByName(name.to_string()));
        state.fail(FailPoint::GetWorkspaceByName, "get workspace")?;

        if state.hidden_lookups > 0 {
            state.hidden_lookups -= 1;
            return Ok(None);
        }
        Ok(state
            .workspaces
            .iter()
            .find(|w| w.display_name == name)
            .cloned())
    }

    async fn list_workspaces(&self) -> DeployResult<Vec<WorkspaceInfo>> {
        let mut state = self.state();
        state.calls.push(Call::ListWorkspaces);
        state.fail(FailPoint::ListWorkspaces, "list workspaces")?;

        if state.hidden_lookups > 0 {
            state.hidden_lookups -= 1;
            return Ok(Vec::new());
        }
        Ok(state.workspaces.clone())
    }

    async fn delete_workspace(&self, workspace_id: &str) -> DeployResult<()> {
        let mut state = self.state();
        state.calls.push(Call::DeleteWorkspace(workspace_id.to_string()));
        state.fail(FailPoint::DeleteWorkspace, "delete workspace")?;

        state.workspaces.retain(|w| w.id != workspace_id);
        state.items.remove(workspace_id);
        state.members.remove(workspace_id);
        Ok(())
    }

    async fn list_items(&self, workspace_id: &str) -> DeployResult<Vec<DeployedItem>> {
        let mut state = self.state();
        state.calls.push(Call::ListItems(workspace_id.to_string()));
        state.fail(FailPoint::ListItems, "list items")?;

        let mut items: Vec<DeployedItem> = state
            .items_mut(workspace_id)?
            .iter()
            .map(|s| s.item.clone())
            .collect();

        if let Some(lingering) = state.lingering.get_mut(workspace_id) {
            for (item, remaining) in lingering.iter_mut() {
                if *remaining > 0 {
                    *remaining -= 1;
                    items.push(item.clone());
                }
            }
            lingering.retain(|(_, remaining)| *remaining > 0);
        }
        Ok(items)
    }

    async fn create_item(
        &self,
        workspace_id: &str,
        metadata: &ItemMetadata,
        definition: Option<&ItemDefinition>,
    ) -> DeployResult<CreateItemOutcome> {
        let mut state = self.state();
        state.calls.push(Call::CreateItem {
            kind: metadata.kind.clone(),
            name: metadata.display_name.clone(),
        });
        state.fail(FailPoint::CreateItem, "create item")?;
        if state.failing_items.contains(&metadata.display_name) {
            return Err(DeployError::RemoteFailure {
                operation: format!("create {}", metadata.display_name),
                status: 400,
                message: "injected item failure".to_string(),
            });
        }

        let items = state.items_mut(workspace_id)?;
        if items
            .iter()
            .any(|s| s.item.kind == metadata.kind && s.item.display_name == metadata.display_name)
        {
            return Err(DeployError::RemoteConflict {
                operation: format!("create {}", metadata.display_name),
                message: "ItemDisplayNameAlreadyInUse".to_string(),
            });
        }

        let id = Uuid::new_v4().to_string();
        items.push(StoredItem {
            item: DeployedItem {
                id: id.clone(),
                kind: metadata.kind.clone(),
                display_name: metadata.display_name.clone(),
                description: metadata.description.clone(),
            },
            definition: definition.cloned(),
        });
        if metadata.kind == ArtifactKind::Eventhouse {
            items.push(StoredItem {
                item: DeployedItem {
                    id: Uuid::new_v4().to_string(),
                    kind: ArtifactKind::KqlDatabase,
                    display_name: metadata.display_name.clone(),
                    description: None,
                },
                definition: None,
            });
        }

        match state.accept_polls {
            Some(polls) => {
                let operation_id = Uuid::new_v4().to_string();
                state.operations.insert(
                    operation_id.clone(),
                    PendingOperation {
                        item_id: id,
                        polls_left: polls,
                    },
                );
                Ok(CreateItemOutcome::Accepted(OperationHandle {
                    id: operation_id,
                    retry_after: None,
                }))
            }
            None => Ok(CreateItemOutcome::Created(id)),
        }
    }

    async fn update_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
        definition: &ItemDefinition,
    ) -> DeployResult<()> {
        let mut state = self.state();
        state.calls.push(Call::UpdateDefinition {
            item_id: item_id.to_string(),
        });
        state.fail(FailPoint::UpdateDefinition, "update definition")?;

        let failing = state.failing_items.clone();
        let stored = state
            .items_mut(workspace_id)?
            .iter_mut()
            .find(|s| s.item.id == item_id)
            .ok_or_else(|| DeployError::RemoteFailure {
                operation: "update definition".to_string(),
                status: 404,
                message: format!("item {} not found", item_id),
            })?;
        if failing.contains(&stored.item.display_name) {
            return Err(DeployError::RemoteFailure {
                operation: format!("update {}", stored.item.display_name),
                status: 400,
                message: "injected item failure".to_string(),
            });
        }
        stored.definition = Some(definition.clone());
        Ok(())
    }

    async fn delete_item(&self, workspace_id: &str, item_id: &str) -> DeployResult<()> {
        let mut state = self.state();
        state.calls.push(Call::DeleteItem {
            item_id: item_id.to_string(),
        });
        state.fail(FailPoint::DeleteItem, "delete item")?;

        let linger = state.linger_lists;
        let items = state.items_mut(workspace_id)?;
        let position = items
            .iter()
            .position(|s| s.item.id == item_id)
            .ok_or_else(|| DeployError::RemoteFailure {
                operation: "delete item".to_string(),
                status: 404,
                message: format!("item {} not found", item_id),
            })?;
        let removed = items.remove(position);

        if linger > 0 {
            state
                .lingering
                .entry(workspace_id.to_string())
                .or_default()
                .push((removed.item, linger));
        }
        Ok(())
    }

    async fn poll_operation(&self, operation_id: &str) -> DeployResult<OperationState> {
        let mut state = self.state();
        state.calls.push(Call::PollOperation(operation_id.to_string()));

        if state.should_fail(FailPoint::Operation) {
            return Ok(OperationState::Failed {
                status: "Failed".to_string(),
                message: "injected operation failure".to_string(),
            });
        }

        let lose_results = state.lose_results;
        let operation = state
            .operations
            .get_mut(operation_id)
            .ok_or_else(|| DeployError::RemoteFailure {
                operation: "poll operation".to_string(),
                status: 404,
                message: format!("operation {} not found", operation_id),
            })?;

        if operation.polls_left > 0 {
            if operation.polls_left != u32::MAX {
                operation.polls_left -= 1;
            }
            return Ok(OperationState::Running);
        }
        Ok(OperationState::Succeeded {
            item_id: (!lose_results).then(|| operation.item_id.clone()),
        })
    }

    async fn get_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
    ) -> DeployResult<ItemDefinition> {
        let mut state = self.state();
        state.calls.push(Call::GetDefinition {
            item_id: item_id.to_string(),
        });
        Ok(state
            .items_mut(workspace_id)?
            .iter()
            .find(|s| s.item.id == item_id)
            .and_then(|s| s.definition.clone())
            .unwrap_or_default())
    }

    async fn eventhouse_query_uri(
        &self,
        workspace_id: &str,
        eventhouse_id: &str,
    ) -> DeployResult<Option<String>> {
        let mut state = self.state();
        state
            .calls
            .push(Call::EventhouseQueryUri(eventhouse_id.to_string()));
        let exists = state
            .items_mut(workspace_id)?
            .iter()
            .any(|s| s.item.id == eventhouse_id && s.item.kind == ArtifactKind::Eventhouse);
        Ok(exists.then(|| format!("https://{}.kusto.example", eventhouse_id)))
    }
}

#[async_trait]
impl AccessProvider for InMemoryFabric {
    async fn list_members(&self, workspace_id: &str) -> DeployResult<Vec<Member>> {
        let mut state = self.state();
        state.calls.push(Call::ListMembers(workspace_id.to_string()));
        state.fail(FailPoint::ListMembers, "list members")?;
        Ok(state.members.get(workspace_id).cloned().unwrap_or_default())
    }

    async fn add_member(&self, workspace_id: &str, member: &Member) -> DeployResult<()> {
        let mut state = self.state();
        state.calls.push(Call::AddMember(member.identifier.clone()));
        state.fail(FailPoint::AddMember, "add member")?;
        state
            .members
            .entry(workspace_id.to_string())
            .or_default()
            .push(member.clone());
        Ok(())
    }

    async fn update_member_role(&self, workspace_id: &str, member: &Member) -> DeployResult<()> {
        let mut state = self.state();
        state.calls.push(Call::UpdateMember(member.identifier.clone()));
        if let Some(existing) = state.members.get_mut(workspace_id).and_then(|members| {
            members
                .iter_mut()
                .find(|m| m.identifier.eq_ignore_ascii_case(&member.identifier))
        }) {
            existing.access = member.access.clone();
        }
        Ok(())
    }

    async fn remove_member(&self, workspace_id: &str, identifier: &str) -> DeployResult<()> {
        let mut state = self.state();
        state.calls.push(Call::RemoveMember(identifier.to_string()));
        if let Some(members) = state.members.get_mut(workspace_id) {
            members.retain(|m| !m.identifier.eq_ignore_ascii_case(identifier));
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionResolver for InMemoryFabric {
    async fn resolve_connection_id(&self, display_name: &str) -> DeployResult<Option<String>> {
        let mut state = self.state();
        state
            .calls
            .push(Call::ResolveConnection(display_name.to_string()));
        Ok(state.connections.get(display_name).cloned())
    }
}
