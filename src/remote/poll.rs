//! Waiting for accepted (asynchronous) item creation

use super::provider::{
    CreateItemOutcome, ItemMetadata, OperationHandle, OperationState, WorkspaceProvider,
};
use crate::error::{DeployError, DeployResult};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Poll cadence: `fast_interval` until `slow_after` has elapsed, `slow_interval` after
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub fast_interval: Duration,
    pub slow_interval: Duration,
    pub slow_after: Duration,
    pub max_duration: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(5),
            slow_interval: Duration::from_secs(30),
            slow_after: Duration::from_secs(60),
            max_duration: Duration::from_secs(900),
        }
    }
}

impl PollPolicy {
    pub fn immediate() -> Self {
        Self {
            fast_interval: Duration::ZERO,
            slow_interval: Duration::ZERO,
            slow_after: Duration::ZERO,
            max_duration: Duration::from_secs(60),
        }
    }

    fn interval_at(&self, elapsed: Duration) -> Duration {
        if elapsed < self.slow_after {
            self.fast_interval
        } else {
            self.slow_interval
        }
    }
}

/// Polls until the operation finishes; returns the created item id when reported
pub async fn wait_for_operation(
    provider: &dyn WorkspaceProvider,
    handle: &OperationHandle,
    policy: &PollPolicy,
) -> DeployResult<Option<String>> {
    let start = Instant::now();
    let mut delay = handle
        .retry_after
        .unwrap_or(policy.fast_interval)
        .min(policy.max_duration);

    loop {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match provider.poll_operation(&handle.id).await? {
            OperationState::Succeeded { item_id } => {
                debug!(
                    operation = %handle.id,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Operation succeeded"
                );
                return Ok(item_id);
            }
            OperationState::Failed { status, message } => {
                return Err(DeployError::OperationFailed {
                    operation_id: handle.id.clone(),
                    status,
                    message,
                });
            }
            OperationState::Running => {}
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.max_duration {
            return Err(DeployError::TimeoutExceeded {
                operation: format!("operation {}", handle.id),
                elapsed,
            });
        }
        delay = policy
            .interval_at(elapsed)
            .min(policy.max_duration - elapsed);
    }
}

/// Turns a create outcome into the new item's id
///
/// When an accepted operation succeeds without reporting the id, the
/// workspace is listed and the item is found by kind and name.
pub async fn settle_created_item(
    provider: &dyn WorkspaceProvider,
    workspace_id: &str,
    metadata: &ItemMetadata,
    outcome: CreateItemOutcome,
    policy: &PollPolicy,
) -> DeployResult<String> {
    let handle = match outcome {
        CreateItemOutcome::Created(id) => return Ok(id),
        CreateItemOutcome::Accepted(handle) => handle,
    };

    if let Some(id) = wait_for_operation(provider, &handle, policy).await? {
        return Ok(id);
    }

    warn!(
        kind = %metadata.kind,
        item = %metadata.display_name,
        "Operation result had no item id, looking the item up"
    );
    provider
        .list_items(workspace_id)
        .await?
        .into_iter()
        .find(|item| item.kind == metadata.kind && item.display_name == metadata.display_name)
        .map(|item| item.id)
        .ok_or_else(|| DeployError::RemoteFailure {
            operation: format!("create {} '{}'", metadata.kind, metadata.display_name),
            status: 202,
            message: "operation succeeded but the item is not listed".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtifactKind;
    use crate::remote::{FailPoint, InMemoryFabric};

    fn metadata(name: &str) -> ItemMetadata {
        ItemMetadata {
            kind: ArtifactKind::Lakehouse,
            display_name: name.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_created_outcome_passes_through() {
        let fabric = InMemoryFabric::new();
        let id = settle_created_item(
            &fabric,
            "ws",
            &metadata("Bronze"),
            CreateItemOutcome::Created("id-1".to_string()),
            &PollPolicy::immediate(),
        )
        .await
        .unwrap();
        assert_eq!(id, "id-1");
    }

    #[tokio::test]
    async fn test_accepted_operation_polled_until_done() {
        let fabric = InMemoryFabric::new();
        let ws = fabric.seed_workspace("Sales");
        fabric.accept_creates(3);

        let outcome = fabric
            .create_item(&ws, &metadata("Bronze"), None)
            .await
            .unwrap();
        assert!(matches!(outcome, CreateItemOutcome::Accepted(_)));

        let id = settle_created_item(&fabric, &ws, &metadata("Bronze"), outcome, &PollPolicy::immediate())
            .await
            .unwrap();
        assert_eq!(fabric.item_id(&ws, &ArtifactKind::Lakehouse, "Bronze"), Some(id));
        assert_eq!(fabric.count_polls(), 4);
    }

    #[tokio::test]
    async fn test_missing_result_falls_back_to_listing() {
        let fabric = InMemoryFabric::new();
        let ws = fabric.seed_workspace("Sales");
        fabric.accept_creates(0);
        fabric.lose_operation_results();

        let outcome = fabric
            .create_item(&ws, &metadata("Bronze"), None)
            .await
            .unwrap();
        let id = settle_created_item(&fabric, &ws, &metadata("Bronze"), outcome, &PollPolicy::immediate())
            .await
            .unwrap();
        assert_eq!(fabric.item_id(&ws, &ArtifactKind::Lakehouse, "Bronze"), Some(id));
    }

    #[tokio::test]
    async fn test_failed_operation_is_error() {
        let fabric = InMemoryFabric::new();
        let ws = fabric.seed_workspace("Sales");
        fabric.accept_creates(0);
        fabric.fail_times(FailPoint::Operation, 1);

        let outcome = fabric
            .create_item(&ws, &metadata("Bronze"), None)
            .await
            .unwrap();
        let err = settle_created_item(&fabric, &ws, &metadata("Bronze"), outcome, &PollPolicy::immediate())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::OperationFailed { .. }));
    }

    #[tokio::test]
    async fn test_operation_timeout() {
        let fabric = InMemoryFabric::new();
        let ws = fabric.seed_workspace("Sales");
        fabric.accept_creates(u32::MAX);

        let outcome = fabric
            .create_item(&ws, &metadata("Bronze"), None)
            .await
            .unwrap();
        let policy = PollPolicy {
            fast_interval: Duration::from_millis(5),
            slow_interval: Duration::from_millis(10),
            slow_after: Duration::from_millis(10),
            max_duration: Duration::from_millis(40),
        };
        let err = settle_created_item(&fabric, &ws, &metadata("Bronze"), outcome, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::TimeoutExceeded { .. }));
    }

    #[test]
    fn test_cadence_escalates() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval_at(Duration::from_secs(1)), Duration::from_secs(5));
        assert_eq!(policy.interval_at(Duration::from_secs(61)), Duration::from_secs(30));
    }
}
