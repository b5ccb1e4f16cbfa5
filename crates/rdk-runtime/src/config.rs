//! [`RobotConfig`] – the declarative description of one robot.

use std::collections::HashSet;

use rdk_resource::ResourceConfig;
use rdk_types::{RdkError, ResourceName};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Another robot whose resources are exposed locally under `name:`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    /// `host:port` or `ws://` URL of the remote's RPC endpoint.
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    #[serde(default)]
    pub components: Vec<ResourceConfig>,
    #[serde(default)]
    pub services: Vec<ResourceConfig>,
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
    /// Keep starting when a resource fails, leaving it (and its dependents)
    /// out of the robot.
    #[serde(default)]
    pub partial_start: bool,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl RobotConfig {
    /// Every resource config, components first.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.components.iter().chain(self.services.iter())
    }

    /// Checks that do not need a registry: unique resource names, unique
    /// remote names and a component/service split that matches each API.
    pub fn validate_shape(&self) -> Result<(), RdkError> {
        for conf in &self.components {
            if !conf.api.is_component() {
                return Err(RdkError::config(
                    conf.path(),
                    format!("{} is not a component api", conf.api),
                ));
            }
        }
        for conf in &self.services {
            if !conf.api.is_service() {
                return Err(RdkError::config(
                    conf.path(),
                    format!("{} is not a service api", conf.api),
                ));
            }
        }

        let mut seen: HashSet<ResourceName> = HashSet::new();
        for conf in self.resources() {
            if !seen.insert(conf.resource_name()) {
                return Err(RdkError::DuplicateResource(conf.resource_name().to_string()));
            }
        }

        let mut remotes: HashSet<&str> = HashSet::new();
        for remote in &self.remotes {
            let path = format!("remotes.{}", remote.name);
            if remote.name.is_empty() || remote.name.contains(':') {
                return Err(RdkError::config(path, "remote name must be non-empty and contain no ':'"));
            }
            if remote.address.is_empty() {
                return Err(RdkError::config(path, "address is required"));
            }
            if !remotes.insert(remote.name.as_str()) {
                return Err(RdkError::DuplicateResource(format!("remote {}", remote.name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdk_types::{Api, Model};

    const ROBOT: &str = r#"
partial_start = true

[network]
listen = "0.0.0.0:9000"

[[components]]
name = "e1"
api = "rdk:component:encoder"
model = "fake"

[[components]]
name = "m1"
api = "motor"
model = "fake"
depends_on = ["b1"]

[components.attributes]
encoder = "e1"
ticks_per_rotation = 100

[[remotes]]
name = "arm"
address = "10.0.0.2:8080"
"#;

    #[test]
    fn parses_from_toml() {
        let cfg: RobotConfig = toml::from_str(ROBOT).unwrap();
        assert!(cfg.partial_start);
        assert_eq!(cfg.network.listen, "0.0.0.0:9000");
        assert_eq!(cfg.components.len(), 2);

        let m1 = &cfg.components[1];
        assert_eq!(m1.api, Api::component("motor"));
        assert_eq!(m1.model, Model::builtin("fake"));
        assert_eq!(m1.depends_on, vec!["b1"]);
        assert_eq!(m1.attributes["ticks_per_rotation"], serde_json::json!(100));
        assert_eq!(cfg.remotes[0].name, "arm");
        cfg.validate_shape().unwrap();
    }

    #[test]
    fn defaults_apply_to_an_empty_file() {
        let cfg: RobotConfig = toml::from_str("").unwrap();
        assert!(!cfg.partial_start);
        assert_eq!(cfg.network.listen, DEFAULT_LISTEN);
        assert_eq!(cfg.resources().count(), 0);
    }

    #[test]
    fn shape_rejects_duplicates_and_misplaced_apis() {
        let motor = ResourceConfig::new(Api::component("motor"), Model::builtin("fake"), "m1");
        let cfg = RobotConfig {
            components: vec![motor.clone(), motor.clone()],
            ..RobotConfig::default()
        };
        assert!(matches!(cfg.validate_shape(), Err(RdkError::DuplicateResource(_))));

        let cfg = RobotConfig {
            services: vec![motor],
            ..RobotConfig::default()
        };
        assert!(matches!(
            cfg.validate_shape(),
            Err(RdkError::ConfigValidation { .. })
        ));

        let cfg = RobotConfig {
            remotes: vec![RemoteConfig {
                name: "a:b".to_string(),
                address: "x:1".to_string(),
            }],
            ..RobotConfig::default()
        };
        assert!(cfg.validate_shape().is_err());
    }
}
