//! Driver configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Default driver name
pub const DEFAULT_DRIVER_NAME: &str = "hostdevice.hostnet.dev";

/// Restart policy for the lifecycle subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
    /// Delay between restarts in seconds
    pub delay_secs: u64,
    /// Uptime in seconds after which a failure no longer counts against the budget
    pub stability_threshold_secs: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay_secs: 5,
            stability_threshold_secs: 5 * 60,
        }
    }
}

impl RestartPolicy {
    /// Delay between restarts
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Stability threshold
    #[must_use]
    pub const fn stability_threshold(&self) -> Duration {
        Duration::from_secs(self.stability_threshold_secs)
    }
}

/// Driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Name the driver publishes devices under
    pub driver_name: String,

    /// Node the driver runs on (hostname when unset)
    pub node_name: Option<String>,

    /// Seconds between device publications
    pub publish_interval_secs: u64,

    /// Interface name prefixes never published
    pub excluded_prefixes: Vec<String>,

    /// Lifecycle subscription restart policy
    pub restart: RestartPolicy,

    /// Newline-delimited JSON lifecycle feed (file or FIFO)
    pub events_path: Option<PathBuf>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            driver_name: DEFAULT_DRIVER_NAME.to_string(),
            node_name: None,
            publish_interval_secs: 5,
            excluded_prefixes: vec!["veth".to_string(), "docker".to_string(), "cni".to_string()],
            restart: RestartPolicy::default(),
            events_path: None,
        }
    }
}

impl DriverConfig {
    /// Create a new configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON configuration file; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| Error::InvalidConfig {
            message: format!("Failed to parse {}: {e}", path.display()),
        })
    }

    /// Set the node name
    #[must_use]
    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    /// Set the publish interval
    #[must_use]
    pub const fn with_publish_interval(mut self, secs: u64) -> Self {
        self.publish_interval_secs = secs;
        self
    }

    /// Set the restart policy
    #[must_use]
    pub const fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Set the lifecycle feed path
    #[must_use]
    pub fn with_events_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.events_path = Some(path.into());
        self
    }

    /// Publish interval
    #[must_use]
    pub const fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `InvalidConfig` describing the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.driver_name.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "driver_name cannot be empty".to_string(),
            });
        }

        if self.node_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::InvalidConfig {
                message: "node_name cannot be empty".to_string(),
            });
        }

        if self.publish_interval_secs == 0 {
            return Err(Error::InvalidConfig {
                message: "publish_interval_secs must be positive".to_string(),
            });
        }

        if self.restart.max_attempts == 0 {
            return Err(Error::InvalidConfig {
                message: "restart.max_attempts must be positive".to_string(),
            });
        }

        if self.excluded_prefixes.iter().any(String::is_empty) {
            return Err(Error::InvalidConfig {
                message: "excluded_prefixes cannot contain an empty prefix".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.publish_interval(), Duration::from_secs(5));
        assert_eq!(config.restart.max_attempts, 10);
        assert_eq!(config.restart.delay(), Duration::from_secs(5));
        assert_eq!(config.restart.stability_threshold(), Duration::from_secs(300));
        assert!(config.excluded_prefixes.contains(&"veth".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = DriverConfig::new()
            .with_node_name("node-a")
            .with_publish_interval(10)
            .with_events_path("/run/hostnet/events");

        assert_eq!(config.node_name.as_deref(), Some("node-a"));
        assert_eq!(config.publish_interval_secs, 10);
        assert_eq!(
            config.events_path.as_deref(),
            Some(Path::new("/run/hostnet/events"))
        );
    }

    #[test]
    fn test_validation() {
        assert!(DriverConfig::new().with_publish_interval(0).validate().is_err());
        assert!(DriverConfig::new().with_node_name(" ").validate().is_err());

        let restart = RestartPolicy {
            max_attempts: 0,
            ..RestartPolicy::default()
        };
        assert!(DriverConfig::new().with_restart(restart).validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: DriverConfig =
            serde_json::from_str(r#"{"node_name":"node-b","restart":{"max_attempts":3}}"#).unwrap();

        assert_eq!(config.node_name.as_deref(), Some("node-b"));
        assert_eq!(config.restart.max_attempts, 3);
        assert_eq!(config.restart.delay_secs, 5);
        assert_eq!(config.driver_name, DEFAULT_DRIVER_NAME);
    }
}
