//! Driver configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::ConfigError;
use crate::task::DEFAULT_ADD_PEER_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Polling interval between two ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Lifetime of an add-peer task before the driver abandons it.
    #[serde(default = "default_add_peer_timeout_secs")]
    pub add_peer_timeout_secs: u64,
}

fn default_tick_interval_ms() -> u64 {
    1_000
}
fn default_add_peer_timeout_secs() -> u64 {
    DEFAULT_ADD_PEER_TIMEOUT.as_secs()
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            add_peer_timeout_secs: default_add_peer_timeout_secs(),
        }
    }
}

impl DriverConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn add_peer_timeout(&self) -> Duration {
        Duration::from_secs(self.add_peer_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0".into()));
        }
        if self.add_peer_timeout_secs == 0 {
            return Err(ConfigError::Invalid("add_peer_timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}
