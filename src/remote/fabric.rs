//! HTTP implementation of the remote traits
//!
//! Items, workspaces, operations and connections go through the Fabric REST
//! API. Name lookups and membership go through the Power BI groups API, which
//! accepts the same bearer token.

use super::auth::TokenSource;
use super::poll::{wait_for_operation, PollPolicy};
use super::provider::{
    AccessProvider, ConnectionResolver, CreateItemOutcome, CreateWorkspaceOutcome,
    DefinitionPart, ItemDefinition, ItemMetadata, Member, OperationHandle, OperationState,
    WorkspaceProvider,
};
use crate::error::{DeployError, DeployResult};
use crate::model::{DeployedItem, WorkspaceInfo};
use async_trait::async_trait;
use base64::engine::general_purpose;
use base64::Engine;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const FABRIC_API: &str = "https://api.fabric.microsoft.com/v1";
pub const POWER_BI_API: &str = "https://api.powerbi.com/v1.0/myorg";

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;
const OPERATION_ID_HEADER: &str = "x-ms-operation-id";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub fabric: String,
    pub power_bi: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            fabric: FABRIC_API.to_string(),
            power_bi: POWER_BI_API.to_string(),
        }
    }
}

pub struct FabricClient {
    http_client: Client,
    tokens: Arc<TokenSource>,
    endpoints: Endpoints,
    /// Used for definition updates and reads that the service answers asynchronously
    poll_policy: PollPolicy,
}

/// Page of a list endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(default)]
    continuation_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupUser {
    identifier: String,
    #[serde(default)]
    principal_type: String,
    #[serde(default)]
    group_user_access_right: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupUserRequest<'a> {
    identifier: &'a str,
    principal_type: &'a str,
    group_user_access_right: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamedResource {
    id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    properties: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    path: String,
    payload: String,
    #[serde(default = "inline_base64")]
    payload_type: String,
}

fn inline_base64() -> String {
    "InlineBase64".to_string()
}

#[derive(Debug, Deserialize)]
struct DefinitionEnvelope {
    definition: WireDefinition,
}

#[derive(Debug, Deserialize)]
struct WireDefinition {
    #[serde(default)]
    parts: Vec<WirePart>,
}

/// Wire form of a definition: every payload base64 encoded inline
pub fn encode_definition(definition: &ItemDefinition) -> Value {
    let parts: Vec<WirePart> = definition
        .parts
        .iter()
        .map(|part| WirePart {
            path: part.path.clone(),
            payload: general_purpose::STANDARD.encode(part.payload.as_bytes()),
            payload_type: inline_base64(),
        })
        .collect();
    json!({ "parts": parts })
}

fn decode_definition(wire: WireDefinition) -> DeployResult<ItemDefinition> {
    let mut parts = Vec::with_capacity(wire.parts.len());
    for part in wire.parts {
        let bytes = general_purpose::STANDARD
            .decode(part.payload.as_bytes())
            .map_err(|e| DeployError::Transport {
                operation: format!("decode definition part {}", part.path),
                source: Box::new(e),
            })?;
        parts.push(DefinitionPart {
            path: part.path,
            payload: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    Ok(ItemDefinition::new(parts))
}

/// Body of a create-item request
pub fn create_item_body(metadata: &ItemMetadata, definition: Option<&ItemDefinition>) -> Value {
    let mut body = json!({
        "displayName": metadata.display_name,
        "type": metadata.kind.as_str(),
    });
    if let Some(description) = metadata.description.as_deref().filter(|d| !d.is_empty()) {
        body["description"] = json!(description);
    }
    if let Some(definition) = definition {
        body["definition"] = encode_definition(definition);
    }
    body
}

/// Handle for a 202 response; `None` when the operation id header is missing
fn operation_handle(headers: &HeaderMap) -> Option<OperationHandle> {
    let id = headers
        .get(OPERATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            // Location ends in /operations/{id}
            headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| loc.trim_end_matches('/').rsplit('/').next())
                .map(str::to_string)
        })?;

    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

    Some(OperationHandle {
        id,
        retry_after: Some(Duration::from_secs(retry_after)),
    })
}

fn error_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error").and_then(|e| e.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Error codes the service answers with a 400 when a name is already taken
const CONFLICT_CODES: &[&str] = &["ItemDisplayNameAlreadyInUse", "WorkspaceNameAlreadyExists"];

fn error_code(body: &Value) -> Option<&str> {
    body.get("errorCode")
        .or_else(|| body.get("error").and_then(|e| e.get("code")))
        .and_then(Value::as_str)
}

/// Builds the error for a non-success answer; 409 and name collisions become `RemoteConflict`
fn failure_from(operation: &str, status: StatusCode, text: String) -> DeployError {
    let body = serde_json::from_str::<Value>(&text).ok();
    let conflict = status == StatusCode::CONFLICT
        || body
            .as_ref()
            .and_then(error_code)
            .is_some_and(|code| CONFLICT_CODES.contains(&code));
    let message = body.as_ref().and_then(error_message).unwrap_or(text);

    if conflict {
        return DeployError::RemoteConflict {
            operation: operation.to_string(),
            message,
        };
    }
    DeployError::RemoteFailure {
        operation: operation.to_string(),
        status: status.as_u16(),
        message,
    }
}

impl FabricClient {
    pub fn new(tokens: Arc<TokenSource>) -> DeployResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| DeployError::Transport {
                operation: "build HTTP client".to_string(),
                source: Box::new(e),
            })?;
        Ok(Self::with_client(http_client, tokens, Endpoints::default()))
    }

    pub fn with_client(http_client: Client, tokens: Arc<TokenSource>, endpoints: Endpoints) -> Self {
        Self {
            http_client,
            tokens,
            endpoints,
            poll_policy: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    fn fabric_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.fabric, path.trim_start_matches('/'))
    }

    fn power_bi_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.power_bi, path.trim_start_matches('/'))
    }

    async fn request(&self, method: Method, url: &str) -> DeployResult<RequestBuilder> {
        let token = self.tokens.bearer().await?;
        Ok(self.http_client.request(method, url).bearer_auth(token))
    }

    async fn send(&self, operation: &str, builder: RequestBuilder) -> DeployResult<Response> {
        let response = builder.send().await.map_err(|e| DeployError::Transport {
            operation: operation.to_string(),
            source: Box::new(e),
        })?;
        debug!(operation, status = response.status().as_u16(), "Remote call");
        Ok(response)
    }

    async fn check(&self, operation: &str, response: Response) -> DeployResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(failure_from(operation, status, text))
    }

    async fn read_json<T: DeserializeOwned>(operation: &str, response: Response) -> DeployResult<T> {
        response.json::<T>().await.map_err(|e| DeployError::Transport {
            operation: format!("{} response", operation),
            source: Box::new(e),
        })
    }

    /// Follows continuation links until the listing is exhausted
    async fn list_all<T: DeserializeOwned>(&self, operation: &str, url: String) -> DeployResult<Vec<T>> {
        let mut values = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next {
            let builder = self.request(Method::GET, &url).await?;
            let response = self.send(operation, builder).await?;
            let response = self.check(operation, response).await?;
            let page: Page<T> = Self::read_json(operation, response).await?;
            values.extend(page.value);
            next = page.continuation_uri.filter(|u| !u.is_empty());
        }
        Ok(values)
    }

    /// Waits for a 202 answer and fetches the operation result body
    async fn finish_accepted(&self, operation: &str, headers: &HeaderMap) -> DeployResult<Option<Value>> {
        let Some(handle) = operation_handle(headers) else {
            warn!(operation, "Accepted response without an operation id");
            return Ok(None);
        };
        wait_for_operation(self, &handle, &self.poll_policy).await?;
        self.operation_result(&handle.id).await
    }

    async fn operation_result(&self, operation_id: &str) -> DeployResult<Option<Value>> {
        let url = self.fabric_url(&format!("operations/{}/result", operation_id));
        let builder = self.request(Method::GET, &url).await?;
        let response = self.send("get operation result", builder).await?;
        if !response.status().is_success() {
            debug!(
                operation = operation_id,
                status = response.status().as_u16(),
                "Operation result unavailable"
            );
            return Ok(None);
        }
        Ok(Some(Self::read_json("get operation result", response).await?))
    }
}

#[async_trait]
impl WorkspaceProvider for FabricClient {
    async fn create_workspace(
        &self,
        name: &str,
        capacity_id: Option<&str>,
    ) -> DeployResult<CreateWorkspaceOutcome> {
        let mut body = json!({ "displayName": name });
        if let Some(capacity) = capacity_id {
            body["capacityId"] = json!(capacity);
        }

        let builder = self
            .request(Method::POST, &self.fabric_url("workspaces"))
            .await?
            .json(&body);
        let response = self.send("create workspace", builder).await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(CreateWorkspaceOutcome::Conflict);
        }
        let response = self.check("create workspace", response).await?;
        let info: WorkspaceInfo = Self::read_json("create workspace", response).await?;
        Ok(CreateWorkspaceOutcome::Created(info))
    }

    async fn get_workspace_by_name(&self, name: &str) -> DeployResult<Option<WorkspaceInfo>> {
        let filter = format!("name eq '{}'", name.replace('\'', "''"));
        let builder = self
            .request(Method::GET, &self.power_bi_url("groups"))
            .await?
            .query(&[("$filter", filter)]);
        let response = self.send("get workspace", builder).await?;
        let response = self.check("get workspace", response).await?;
        let page: Page<GroupEntry> = Self::read_json("get workspace", response).await?;

        Ok(page
            .value
            .into_iter()
            .find(|g| g.name == name)
            .map(|g| WorkspaceInfo {
                id: g.id,
                display_name: g.name,
            }))
    }

    async fn list_workspaces(&self) -> DeployResult<Vec<WorkspaceInfo>> {
        self.list_all("list workspaces", self.fabric_url("workspaces"))
            .await
    }

    async fn delete_workspace(&self, workspace_id: &str) -> DeployResult<()> {
        let url = self.fabric_url(&format!("workspaces/{}", workspace_id));
        let builder = self.request(Method::DELETE, &url).await?;
        let response = self.send("delete workspace", builder).await?;
        self.check("delete workspace", response).await?;
        Ok(())
    }

    async fn list_items(&self, workspace_id: &str) -> DeployResult<Vec<DeployedItem>> {
        let url = self.fabric_url(&format!("workspaces/{}/items", workspace_id));
        self.list_all("list items", url).await
    }

    async fn create_item(
        &self,
        workspace_id: &str,
        metadata: &ItemMetadata,
        definition: Option<&ItemDefinition>,
    ) -> DeployResult<CreateItemOutcome> {
        let operation = format!("create {} '{}'", metadata.kind, metadata.display_name);
        let url = self.fabric_url(&format!("workspaces/{}/items", workspace_id));
        let builder = self
            .request(Method::POST, &url)
            .await?
            .json(&create_item_body(metadata, definition));
        let response = self.send(&operation, builder).await?;

        if response.status() == StatusCode::ACCEPTED {
            return operation_handle(response.headers())
                .map(CreateItemOutcome::Accepted)
                .ok_or_else(|| DeployError::RemoteFailure {
                    operation,
                    status: 202,
                    message: "accepted without an operation id".to_string(),
                });
        }

        let response = self.check(&operation, response).await?;
        let created: NamedResource = Self::read_json(&operation, response).await?;
        Ok(CreateItemOutcome::Created(created.id))
    }

    async fn update_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
        definition: &ItemDefinition,
    ) -> DeployResult<()> {
        let url = self.fabric_url(&format!(
            "workspaces/{}/items/{}/updateDefinition",
            workspace_id, item_id
        ));
        let builder = self
            .request(Method::POST, &url)
            .await?
            .json(&json!({ "definition": encode_definition(definition) }));
        let response = self.send("update definition", builder).await?;

        if response.status() == StatusCode::ACCEPTED {
            self.finish_accepted("update definition", response.headers())
                .await?;
            return Ok(());
        }
        self.check("update definition", response).await?;
        Ok(())
    }

    async fn delete_item(&self, workspace_id: &str, item_id: &str) -> DeployResult<()> {
        let url = self.fabric_url(&format!("workspaces/{}/items/{}", workspace_id, item_id));
        let builder = self.request(Method::DELETE, &url).await?;
        let response = self.send("delete item", builder).await?;
        self.check("delete item", response).await?;
        Ok(())
    }

    async fn poll_operation(&self, operation_id: &str) -> DeployResult<OperationState> {
        let url = self.fabric_url(&format!("operations/{}", operation_id));
        let builder = self.request(Method::GET, &url).await?;
        let response = self.send("poll operation", builder).await?;
        let response = self.check("poll operation", response).await?;
        let status: OperationStatus = Self::read_json("poll operation", response).await?;

        match status.status.trim().to_ascii_lowercase().as_str() {
            "succeeded" => {
                let item_id = self
                    .operation_result(operation_id)
                    .await?
                    .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string));
                Ok(OperationState::Succeeded { item_id })
            }
            "failed" | "cancelled" => Ok(OperationState::Failed {
                message: status
                    .error
                    .as_ref()
                    .and_then(error_message)
                    .unwrap_or_else(|| "no error details".to_string()),
                status: status.status,
            }),
            _ => Ok(OperationState::Running),
        }
    }

    async fn get_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
    ) -> DeployResult<ItemDefinition> {
        let url = self.fabric_url(&format!(
            "workspaces/{}/items/{}/getDefinition",
            workspace_id, item_id
        ));
        let builder = self.request(Method::POST, &url).await?;
        let response = self.send("get definition", builder).await?;

        let body: Value = if response.status() == StatusCode::ACCEPTED {
            self.finish_accepted("get definition", response.headers())
                .await?
                .ok_or_else(|| DeployError::RemoteFailure {
                    operation: "get definition".to_string(),
                    status: 202,
                    message: "operation finished without a result".to_string(),
                })?
        } else {
            let response = self.check("get definition", response).await?;
            Self::read_json("get definition", response).await?
        };

        let envelope: DefinitionEnvelope =
            serde_json::from_value(body).map_err(|e| DeployError::json("item definition", e))?;
        decode_definition(envelope.definition)
    }

    async fn eventhouse_query_uri(
        &self,
        workspace_id: &str,
        eventhouse_id: &str,
    ) -> DeployResult<Option<String>> {
        let url = self.fabric_url(&format!("workspaces/{}/eventhouses", workspace_id));
        let eventhouses: Vec<NamedResource> = self.list_all("list eventhouses", url).await?;

        Ok(eventhouses
            .into_iter()
            .find(|e| e.id == eventhouse_id)
            .and_then(|e| e.properties)
            .and_then(|p| {
                p.get("queryServiceUri")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            }))
    }
}

#[async_trait]
impl AccessProvider for FabricClient {
    async fn list_members(&self, workspace_id: &str) -> DeployResult<Vec<Member>> {
        let url = self.power_bi_url(&format!("groups/{}/users", workspace_id));
        let users: Vec<GroupUser> = self.list_all("list members", url).await?;
        Ok(users
            .into_iter()
            .map(|u| Member {
                identifier: u.identifier,
                principal_type: u.principal_type,
                access: u.group_user_access_right,
            })
            .collect())
    }

    async fn add_member(&self, workspace_id: &str, member: &Member) -> DeployResult<()> {
        self.write_member(Method::POST, "add member", workspace_id, member)
            .await
    }

    async fn update_member_role(&self, workspace_id: &str, member: &Member) -> DeployResult<()> {
        self.write_member(Method::PUT, "update member", workspace_id, member)
            .await
    }

    async fn remove_member(&self, workspace_id: &str, identifier: &str) -> DeployResult<()> {
        let url = self.power_bi_url(&format!("groups/{}/users/{}", workspace_id, identifier));
        let builder = self.request(Method::DELETE, &url).await?;
        let response = self.send("remove member", builder).await?;
        self.check("remove member", response).await?;
        Ok(())
    }
}

impl FabricClient {
    async fn write_member(
        &self,
        method: Method,
        operation: &str,
        workspace_id: &str,
        member: &Member,
    ) -> DeployResult<()> {
        let url = self.power_bi_url(&format!("groups/{}/users", workspace_id));
        let body = GroupUserRequest {
            identifier: &member.identifier,
            principal_type: &member.principal_type,
            group_user_access_right: &member.access,
        };
        let builder = self.request(method, &url).await?.json(&body);
        let response = self.send(operation, builder).await?;
        self.check(operation, response).await?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionResolver for FabricClient {
    async fn resolve_connection_id(&self, display_name: &str) -> DeployResult<Option<String>> {
        let connections: Vec<NamedResource> = self
            .list_all("list connections", self.fabric_url("connections"))
            .await?;
        Ok(connections
            .into_iter()
            .find(|c| c.display_name == display_name)
            .map(|c| c.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtifactKind;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_display_name_collision_is_conflict() {
        let body = r#"{"requestId":"r1","errorCode":"ItemDisplayNameAlreadyInUse","message":"Item name is already in use."}"#;
        match failure_from("create Bronze", StatusCode::BAD_REQUEST, body.to_string()) {
            DeployError::RemoteConflict { operation, message } => {
                assert_eq!(operation, "create Bronze");
                assert_eq!(message, "Item name is already in use.");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_conflict_status_is_conflict() {
        let err = failure_from("create workspace", StatusCode::CONFLICT, String::new());
        assert!(matches!(err, DeployError::RemoteConflict { .. }));

        let nested = r#"{"error":{"code":"WorkspaceNameAlreadyExists","message":"taken"}}"#;
        let err = failure_from("create workspace", StatusCode::BAD_REQUEST, nested.to_string());
        assert!(matches!(err, DeployError::RemoteConflict { .. }));
    }

    #[test]
    fn test_other_bad_request_is_failure() {
        let body = r#"{"errorCode":"InvalidDefinitionParts","message":"bad part"}"#;
        match failure_from("create Load", StatusCode::BAD_REQUEST, body.to_string()) {
            DeployError::RemoteFailure { status, message, .. } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad part");
            }
            other => panic!("unexpected error {:?}", other),
        }

        let err = failure_from("list items", StatusCode::BAD_GATEWAY, "upstream".to_string());
        assert!(matches!(err, DeployError::RemoteFailure { status: 502, ref message, .. } if message == "upstream"));
    }

    #[test]
    fn test_create_body_encodes_parts() {
        let metadata = ItemMetadata {
            kind: ArtifactKind::Notebook,
            display_name: "Load".to_string(),
            description: Some("loads data".to_string()),
        };
        let definition = ItemDefinition::new(vec![DefinitionPart {
            path: "notebook-content.py".to_string(),
            payload: "print(1)".to_string(),
        }]);

        let body = create_item_body(&metadata, Some(&definition));
        assert_eq!(body["type"], "Notebook");
        assert_eq!(body["description"], "loads data");
        let part = &body["definition"]["parts"][0];
        assert_eq!(part["payloadType"], "InlineBase64");
        assert_eq!(part["payload"], general_purpose::STANDARD.encode("print(1)"));
    }

    #[test]
    fn test_create_body_without_definition() {
        let metadata = ItemMetadata {
            kind: ArtifactKind::Lakehouse,
            display_name: "Bronze".to_string(),
            description: None,
        };
        let body = create_item_body(&metadata, None);
        assert!(body.get("definition").is_none());
        assert!(body.get("description").is_none());
    }

    #[test]
    fn test_decode_round_trips_text() {
        let wire = WireDefinition {
            parts: vec![WirePart {
                path: "a.json".to_string(),
                payload: general_purpose::STANDARD.encode("{\"x\":1}"),
                payload_type: inline_base64(),
            }],
        };
        let definition = decode_definition(wire).unwrap();
        assert_eq!(definition.part("a.json").unwrap().payload, "{\"x\":1}");
    }

    #[test]
    fn test_operation_handle_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(OPERATION_ID_HEADER, HeaderValue::from_static("op-1"));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let handle = operation_handle(&headers).unwrap();
        assert_eq!(handle.id, "op-1");
        assert_eq!(handle.retry_after, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_operation_handle_falls_back_to_location() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LOCATION,
            HeaderValue::from_static("https://api.fabric.microsoft.com/v1/operations/op-2"),
        );
        let handle = operation_handle(&headers).unwrap();
        assert_eq!(handle.id, "op-2");
        assert_eq!(handle.retry_after, Some(Duration::from_secs(30)));

        assert!(operation_handle(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(&json!({"message": "flat"})).as_deref(),
            Some("flat")
        );
        assert_eq!(
            error_message(&json!({"error": {"message": "nested"}})).as_deref(),
            Some("nested")
        );
        assert_eq!(error_message(&json!({})), None);
    }

    #[test]
    fn test_page_tolerates_missing_fields() {
        let page: Page<GroupEntry> = serde_json::from_str(r#"{"value":[{"id":"1","name":"Sales"}]}"#).unwrap();
        assert_eq!(page.value.len(), 1);
        assert!(page.continuation_uri.is_none());
    }
}
