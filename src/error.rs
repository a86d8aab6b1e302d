//! Error types for deployment operations
//!
//! Every failure surfaced by the engine is a [`DeployError`]. Wrapping variants
//! (`Phase`, `Item`, `PartialApply`) keep the underlying cause reachable through
//! [`std::error::Error::source`], so callers can print the full causal chain.

use crate::config::ConfigError;
use crate::model::DeploymentRecord;
use std::error::Error as StdError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Malformed artifact metadata or inconsistent desired state
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A definition references a logical id whose item has no runtime id yet
    #[error("Logical id {logical_id} of {kind} '{name}' is referenced before it was deployed")]
    NotYetDeployed {
        logical_id: String,
        kind: String,
        name: String,
    },

    #[error("Dependency cycle detected among: {}", remaining.join(", "))]
    CycleDetected { remaining: Vec<String> },

    #[error("Conflict during {operation}: {message}")]
    RemoteConflict { operation: String, message: String },

    #[error("{operation} failed with status {status}: {message}")]
    RemoteFailure {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("{operation} request could not be sent")]
    Transport {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Operation {operation_id} ended with status {status}: {message}")]
    OperationFailed {
        operation_id: String,
        status: String,
        message: String,
    },

    #[error("Timed out after {}s waiting for {operation}", elapsed.as_secs())]
    TimeoutExceeded { operation: String, elapsed: Duration },

    /// Reconciliation stopped part-way; `applied` lists what already landed remotely
    #[error("Deployment aborted in phase {phase} after {} applied change(s)", applied.len())]
    PartialApply {
        phase: String,
        applied: Vec<DeploymentRecord>,
        #[source]
        source: Box<DeployError>,
    },

    #[error("{step} failed")]
    Phase {
        step: String,
        #[source]
        source: Box<DeployError>,
    },

    #[error("{kind} '{name}' could not be deployed")]
    Item {
        kind: String,
        name: String,
        #[source]
        source: Box<DeployError>,
    },

    #[error("Failed to read {}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Invalid JSON in {context}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DeployError {
    pub fn validation(message: impl Into<String>) -> Self {
        DeployError::Validation(message.into())
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        DeployError::Filesystem {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        DeployError::Json {
            context: context.into(),
            source,
        }
    }

    pub fn in_step(self, step: impl Into<String>) -> Self {
        DeployError::Phase {
            step: step.into(),
            source: Box::new(self),
        }
    }

    pub fn for_item(self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        DeployError::Item {
            kind: kind.into(),
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping the context wrappers added by the engine
    pub fn root_cause(&self) -> &DeployError {
        match self {
            DeployError::PartialApply { source, .. }
            | DeployError::Phase { source, .. }
            | DeployError::Item { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Records already applied before the failure, if the error carries them
    pub fn applied_records(&self) -> &[DeploymentRecord] {
        match self {
            DeployError::PartialApply { applied, .. } => applied,
            DeployError::Phase { source, .. } | DeployError::Item { source, .. } => {
                source.applied_records()
            }
            _ => &[],
        }
    }
}

/// Renders an error and all of its sources as `outer: inner: root`
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(cause) = current {
        parts.push(cause.to_string());
        current = cause.source();
    }
    parts.join(": ")
}
