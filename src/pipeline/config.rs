use crate::config::{ConnectionSpec, DeployConfig, Quiescence};
use crate::remote::PollPolicy;
use crate::rewrite::LakehouseRef;
use std::time::Duration;

/// Lakehouse attached to every notebook of a layer that requires one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedLakehouse {
    pub name: String,
    /// Set when the lakehouse lives outside the target workspace
    pub external: Option<LakehouseRef>,
}

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub poll: PollPolicy,
    pub quiescence: Quiescence,
    pub connections: Vec<ConnectionSpec>,
    pub forced_lakehouse: Option<ForcedLakehouse>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            quiescence: Quiescence::Probe {
                interval: Duration::from_secs(15),
                timeout: Duration::from_secs(450),
            },
            connections: Vec::new(),
            forced_lakehouse: None,
        }
    }
}

impl ReconcileSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// The external default lakehouse, if any, is resolved later by the caller
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            poll: config.poll.clone(),
            quiescence: config.quiescence,
            connections: config.connections.clone(),
            forced_lakehouse: config
                .forces_default_lakehouse()
                .then(|| ForcedLakehouse {
                    name: config.default_lakehouse.clone(),
                    external: None,
                }),
        }
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_quiescence(mut self, quiescence: Quiescence) -> Self {
        self.quiescence = quiescence;
        self
    }

    pub fn with_connections(mut self, connections: Vec<ConnectionSpec>) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_forced_lakehouse(mut self, forced: ForcedLakehouse) -> Self {
        self.forced_lakehouse = Some(forced);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ReconcileSettings::default();
        assert_eq!(settings.poll, PollPolicy::default());
        assert!(settings.forced_lakehouse.is_none());
        assert!(matches!(settings.quiescence, Quiescence::Probe { .. }));
    }

    #[test]
    fn test_builder_pattern() {
        let settings = ReconcileSettings::new()
            .with_poll(PollPolicy::immediate())
            .with_quiescence(Quiescence::Fixed(Duration::ZERO))
            .with_forced_lakehouse(ForcedLakehouse {
                name: "Bronze".to_string(),
                external: None,
            });

        assert_eq!(settings.poll, PollPolicy::immediate());
        assert_eq!(settings.quiescence, Quiescence::Fixed(Duration::ZERO));
        assert_eq!(settings.forced_lakehouse.unwrap().name, "Bronze");
    }

    #[test]
    fn test_from_config_forces_only_marked_layers() {
        let mut config = DeployConfig {
            workspace_name: "Sales".to_string(),
            ..DeployConfig::default()
        };
        assert!(ReconcileSettings::from_config(&config)
            .forced_lakehouse
            .is_none());

        config.layer = "Data_Ingestion".to_string();
        let forced = ReconcileSettings::from_config(&config)
            .forced_lakehouse
            .unwrap();
        assert_eq!(forced.name, "Bronze");
        assert!(forced.external.is_none());
    }
}
