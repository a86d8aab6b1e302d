//! Deployment configuration
//!
//! Settings are read once from `FABRIC_DEPLOY_*` environment variables with
//! defaults, optionally overridden by CLI flags, then validated before any
//! remote call is made.
//!
//! # Environment Variables
//!
//! - `FABRIC_DEPLOY_WORKSPACE`: target workspace name - **required**
//! - `FABRIC_DEPLOY_CAPACITY_ID`: capacity to create the workspace on; empty,
//!   `none`, `nan`, the placeholder id or the all-zero id mean "trial"
//! - `FABRIC_DEPLOY_ARTIFACT_ROOT`: repository root - default: "."
//! - `FABRIC_DEPLOY_LAYER`: transformation layer under `ARM/` - default: "Operations"
//! - `FABRIC_DEPLOY_MEMBERS`: `|`-separated member JSON objects
//! - `FABRIC_DEPLOY_CONNECTIONS`: `{"Connections":[{"type":..,"connection_name":..}]}`
//! - `FABRIC_DEPLOY_RATE_LIMIT`: mutating calls per window - default: "30"
//! - `FABRIC_DEPLOY_RATE_WINDOW_SECS`: default: "55"
//! - `FABRIC_DEPLOY_POLL_FAST_SECS` / `_POLL_SLOW_SECS` / `_POLL_SLOW_AFTER_SECS` /
//!   `_POLL_MAX_SECS`: operation polling cadence - defaults: 5 / 30 / 60 / 900
//! - `FABRIC_DEPLOY_LOOKUP_ATTEMPTS` / `_LOOKUP_DELAY_SECS`: workspace lookup
//!   retry - defaults: 3 / 2
//! - `FABRIC_DEPLOY_QUIESCENCE`: `probe` or `fixed` - default: "probe"
//! - `FABRIC_DEPLOY_QUIESCENCE_SECS`: probe timeout or fixed wait - default: "450"
//! - `FABRIC_DEPLOY_QUIESCENCE_INTERVAL_SECS`: probe interval - default: "15"
//! - `FABRIC_DEPLOY_DEFAULT_LAKEHOUSE`: default: "Bronze"
//! - `FABRIC_DEPLOY_DEFAULT_LAKEHOUSE_WORKSPACE`: workspace holding it, if not the target
//! - `FABRIC_DEPLOY_FORCE_ATTACH_LAYERS`: comma-separated - default:
//!   "Data_Ingestion,Data_Non_Security"

use crate::access::parse_members;
use crate::remote::{Member, PollPolicy};
use crate::rewrite::ZERO_GUID;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LAYER: &str = "Operations";
const DEFAULT_RATE_LIMIT: u32 = 30;
const DEFAULT_RATE_WINDOW_SECS: u64 = 55;
const DEFAULT_LOOKUP_ATTEMPTS: u32 = 3;
const DEFAULT_LOOKUP_DELAY_SECS: u64 = 2;
const DEFAULT_QUIESCENCE_SECS: u64 = 450;
const DEFAULT_QUIESCENCE_INTERVAL_SECS: u64 = 15;
const DEFAULT_LAKEHOUSE: &str = "Bronze";
const DEFAULT_FORCE_ATTACH_LAYERS: [&str; 2] = ["Data_Ingestion", "Data_Non_Security"];
const PLACEHOLDER_CAPACITY: &str = "capacity_id_1234567890";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// How the run waits for deletions to settle before redeploying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quiescence {
    /// Re-list items every `interval` until deleted ids are gone, at most `timeout`
    Probe { interval: Duration, timeout: Duration },
    Fixed(Duration),
}

/// One entry of the connections document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionSpec {
    #[serde(rename = "type")]
    pub connection_type: String,
    pub connection_name: String,
}

#[derive(Debug, Deserialize)]
struct ConnectionsDocument {
    #[serde(rename = "Connections", default)]
    connections: Vec<ConnectionSpec>,
}

/// Parses `{"Connections": [...]}`; single quotes are accepted
pub fn parse_connections(raw: &str) -> Result<Vec<ConnectionSpec>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let normalized = raw.replace('\'', "\"");
    serde_json::from_str::<ConnectionsDocument>(&normalized)
        .map(|doc| doc.connections)
        .map_err(|e| ConfigError::ParseError {
            field: "FABRIC_DEPLOY_CONNECTIONS".to_string(),
            error: e.to_string(),
        })
}

/// `None` for trial workspaces
pub fn normalize_capacity(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    let is_trial = value.is_empty()
        || value.eq_ignore_ascii_case("none")
        || value.eq_ignore_ascii_case("nan")
        || value == PLACEHOLDER_CAPACITY
        || value == ZERO_GUID;
    (!is_trial).then(|| value.to_string())
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub workspace_name: String,
    pub capacity_id: Option<String>,
    pub artifact_root: PathBuf,
    pub layer: String,
    pub members: Vec<Member>,
    pub connections: Vec<ConnectionSpec>,
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub poll: PollPolicy,
    pub lookup_attempts: u32,
    pub lookup_delay: Duration,
    pub quiescence: Quiescence,
    pub default_lakehouse: String,
    pub default_lakehouse_workspace: Option<String>,
    pub force_attach_layers: Vec<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            workspace_name: String::new(),
            capacity_id: None,
            artifact_root: PathBuf::from("."),
            layer: DEFAULT_LAYER.to_string(),
            members: Vec::new(),
            connections: Vec::new(),
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
            poll: PollPolicy::default(),
            lookup_attempts: DEFAULT_LOOKUP_ATTEMPTS,
            lookup_delay: Duration::from_secs(DEFAULT_LOOKUP_DELAY_SECS),
            quiescence: Quiescence::Probe {
                interval: Duration::from_secs(DEFAULT_QUIESCENCE_INTERVAL_SECS),
                timeout: Duration::from_secs(DEFAULT_QUIESCENCE_SECS),
            },
            default_lakehouse: DEFAULT_LAKEHOUSE.to_string(),
            default_lakehouse_workspace: None,
            force_attach_layers: DEFAULT_FORCE_ATTACH_LAYERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match var(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::ParseError {
            field: name.to_string(),
            error: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn seconds(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    parsed(name, default.as_secs()).map(Duration::from_secs)
}

impl DeployConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = DeployConfig::default();

        let poll = PollPolicy {
            fast_interval: seconds("FABRIC_DEPLOY_POLL_FAST_SECS", defaults.poll.fast_interval)?,
            slow_interval: seconds("FABRIC_DEPLOY_POLL_SLOW_SECS", defaults.poll.slow_interval)?,
            slow_after: seconds("FABRIC_DEPLOY_POLL_SLOW_AFTER_SECS", defaults.poll.slow_after)?,
            max_duration: seconds("FABRIC_DEPLOY_POLL_MAX_SECS", defaults.poll.max_duration)?,
        };

        let quiescence_secs = seconds(
            "FABRIC_DEPLOY_QUIESCENCE_SECS",
            Duration::from_secs(DEFAULT_QUIESCENCE_SECS),
        )?;
        let quiescence = match var("FABRIC_DEPLOY_QUIESCENCE")
            .map(|v| v.trim().to_lowercase())
            .as_deref()
        {
            None | Some("probe") => Quiescence::Probe {
                interval: seconds(
                    "FABRIC_DEPLOY_QUIESCENCE_INTERVAL_SECS",
                    Duration::from_secs(DEFAULT_QUIESCENCE_INTERVAL_SECS),
                )?,
                timeout: quiescence_secs,
            },
            Some("fixed") => Quiescence::Fixed(quiescence_secs),
            Some(other) => {
                return Err(ConfigError::ParseError {
                    field: "FABRIC_DEPLOY_QUIESCENCE".to_string(),
                    error: format!("unknown mode '{}', expected probe or fixed", other),
                })
            }
        };

        let members = match var("FABRIC_DEPLOY_MEMBERS") {
            Some(raw) => parse_members(&raw).map_err(|e| ConfigError::ParseError {
                field: "FABRIC_DEPLOY_MEMBERS".to_string(),
                error: e.to_string(),
            })?,
            None => Vec::new(),
        };

        let force_attach_layers = var("FABRIC_DEPLOY_FORCE_ATTACH_LAYERS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.force_attach_layers);

        Ok(Self {
            workspace_name: var("FABRIC_DEPLOY_WORKSPACE")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            capacity_id: normalize_capacity(var("FABRIC_DEPLOY_CAPACITY_ID").as_deref()),
            artifact_root: var("FABRIC_DEPLOY_ARTIFACT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_root),
            layer: var("FABRIC_DEPLOY_LAYER")
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.layer),
            members,
            connections: parse_connections(&var("FABRIC_DEPLOY_CONNECTIONS").unwrap_or_default())?,
            rate_limit: parsed("FABRIC_DEPLOY_RATE_LIMIT", defaults.rate_limit)?,
            rate_window: seconds("FABRIC_DEPLOY_RATE_WINDOW_SECS", defaults.rate_window)?,
            poll,
            lookup_attempts: parsed("FABRIC_DEPLOY_LOOKUP_ATTEMPTS", defaults.lookup_attempts)?,
            lookup_delay: seconds("FABRIC_DEPLOY_LOOKUP_DELAY_SECS", defaults.lookup_delay)?,
            quiescence,
            default_lakehouse: var("FABRIC_DEPLOY_DEFAULT_LAKEHOUSE")
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.default_lakehouse),
            default_lakehouse_workspace: var("FABRIC_DEPLOY_DEFAULT_LAKEHOUSE_WORKSPACE")
                .map(|v| v.trim().to_string()),
            force_attach_layers,
        })
    }

    /// Replaces the declared members with a `|`-separated declaration
    pub fn set_members(&mut self, declaration: &str) -> Result<(), ConfigError> {
        self.members = parse_members(declaration).map_err(|e| ConfigError::ParseError {
            field: "members".to_string(),
            error: e.to_string(),
        })?;
        Ok(())
    }

    /// Directory holding the layer's item folders
    pub fn layer_root(&self) -> PathBuf {
        self.artifact_root.join("ARM")
    }

    /// Whether notebooks in this layer get the default lakehouse attached
    pub fn forces_default_lakehouse(&self) -> bool {
        self.force_attach_layers
            .iter()
            .any(|marker| self.layer.contains(marker.as_str()))
    }

    pub fn connection_name(&self, connection_type: &str) -> Option<&str> {
        self.connections
            .iter()
            .find(|c| c.connection_type == connection_type)
            .map(|c| c.connection_name.as_str())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Workspace name must not be empty (set FABRIC_DEPLOY_WORKSPACE or --workspace)"
                    .to_string(),
            ));
        }
        if self.layer.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Layer must not be empty".to_string(),
            ));
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "Rate limit must allow at least one operation per window".to_string(),
            ));
        }
        if self.rate_window.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "Rate limit window must be at least 1 second".to_string(),
            ));
        }
        if self.poll.max_duration.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "Operation polling needs a non-zero maximum duration".to_string(),
            ));
        }
        if self.poll.fast_interval > self.poll.slow_interval {
            return Err(ConfigError::ValidationFailed(format!(
                "Fast poll interval ({}s) exceeds slow poll interval ({}s)",
                self.poll.fast_interval.as_secs(),
                self.poll.slow_interval.as_secs()
            )));
        }
        if self.lookup_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "Workspace lookup needs at least one attempt".to_string(),
            ));
        }
        if let Quiescence::Probe { interval, timeout } = self.quiescence {
            if interval.is_zero() && !timeout.is_zero() {
                return Err(ConfigError::ValidationFailed(
                    "Quiescence probe interval must be at least 1 second".to_string(),
                ));
            }
        }
        if self.default_lakehouse.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Default lakehouse name must not be empty".to_string(),
            ));
        }
        for connection in &self.connections {
            if connection.connection_type.trim().is_empty()
                || connection.connection_name.trim().is_empty()
            {
                return Err(ConfigError::ValidationFailed(
                    "Connections need both a type and a connection_name".to_string(),
                ));
            }
        }
        crate::access::validate_unique_roles(&self.members)
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
        Ok(())
    }
}

impl fmt::Display for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deployment Configuration:")?;
        writeln!(f, "  Workspace: {}", self.workspace_name)?;
        writeln!(
            f,
            "  Capacity: {}",
            self.capacity_id.as_deref().unwrap_or("(trial)")
        )?;
        writeln!(f, "  Artifacts: {}", self.layer_root().join(&self.layer).display())?;
        writeln!(f, "  Members: {}", self.members.len())?;
        writeln!(f, "  Connections: {}", self.connections.len())?;
        writeln!(
            f,
            "  Rate Limit: {} per {}s",
            self.rate_limit,
            self.rate_window.as_secs()
        )?;
        match self.quiescence {
            Quiescence::Probe { timeout, .. } => {
                writeln!(f, "  Quiescence: probe (up to {}s)", timeout.as_secs())?
            }
            Quiescence::Fixed(wait) => writeln!(f, "  Quiescence: fixed {}s", wait.as_secs())?,
        }
        Ok(())
    }
}
