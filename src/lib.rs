//! fabric-deploy - dependency-aware deployment of Fabric workspace artifacts
//!
//! This library reconciles a remote workspace with the item folders of one
//! repository layer. Lakehouses, eventhouses, notebooks and data pipelines are
//! published in dependency order, with design-time logical ids rewritten to
//! the runtime ids assigned on publish.
//!
//! # Core Concepts
//!
//! - **Catalog**: items keyed by kind and display name, built either from the
//!   source tree or from the remote listing
//! - **Dependency graph**: pipelines that invoke other pipelines; publishing
//!   walks it referenced-first, teardown referrer-first
//! - **Reconciliation**: the ordered phases that create, update or delete
//!   items and return a ledger of [`DeploymentRecord`]s
//! - **Lifecycle**: workspace resolution or creation, membership, and
//!   compensation when a freshly created workspace cannot be populated
//!
//! # Example Usage
//!
//! ```ignore
//! use fabric_deploy::{DeployConfig, Services, WorkspaceLifecycle};
//! use fabric_deploy::fs::RealFileSystem;
//! use std::sync::Arc;
//!
//! async fn deploy(client: Arc<FabricClient>) -> anyhow::Result<()> {
//!     let config = DeployConfig::from_env()?;
//!     let services = Services::new(client.clone(), client.clone(), Arc::new(RealFileSystem::new()));
//!
//!     let report = WorkspaceLifecycle::new(config, services, client).run().await?;
//!     for record in &report.records {
//!         println!("{} {}", record.artifact_type, record.artifact_name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`catalog`]: repository scanning and deployed listings
//! - [`graph`]: pipeline references and topological ordering
//! - [`rewrite`]: logical id, connection and lakehouse substitution
//! - [`pipeline`]: reconciliation phases and their orchestrator
//! - [`lifecycle`]: workspace lifecycle and offline planning
//! - [`remote`]: provider traits, the HTTP client and an in-memory double

pub mod access;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod graph;
pub mod lifecycle;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod remote;
pub mod rewrite;
pub mod util;

pub use catalog::{Catalog, CatalogEntry, RepositoryScanner};
pub use config::{ConfigError, DeployConfig};
pub use error::{DeployError, DeployResult};
pub use lifecycle::{DeploymentPlan, DeploymentReport, WorkspaceLifecycle};
pub use model::{ArtifactKind, DeploymentRecord, WorkspaceInfo};
pub use pipeline::{ReconcileContext, ReconcileMode, ReconcileOrchestrator, Services};
pub use remote::{AccessProvider, ConnectionResolver, FabricClient, WorkspaceProvider};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
