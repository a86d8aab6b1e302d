//! Remote item store: traits, the HTTP client and an in-memory double

pub mod auth;
pub mod fabric;
pub mod mock;
pub mod poll;
pub mod provider;
pub mod rate_limit;

pub use auth::{ClientCredentials, TokenSource};
pub use fabric::{Endpoints, FabricClient};
pub use mock::{Call, FailPoint, InMemoryFabric};
pub use poll::{settle_created_item, wait_for_operation, PollPolicy};
pub use provider::{
    AccessProvider, ConnectionResolver, CreateItemOutcome, CreateWorkspaceOutcome,
    DefinitionPart, ItemDefinition, ItemMetadata, Member, OperationHandle, OperationState,
    WorkspaceProvider,
};
pub use rate_limit::{RateLimiter, TokenBucket, Unlimited};

#[cfg(test)]
pub use provider::MockConnectionResolver;
