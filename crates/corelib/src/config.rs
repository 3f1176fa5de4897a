//! Node configuration.
//!
//! Read from a JSON document; every field is optional.
//!
//! ```json
//! { "display_name": "lab-server", "relay": true, "callback_workers": 4 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_callback_workers() -> usize {
    2
}

/// Settings of one node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Name associated with the local session at startup.
    pub display_name: Option<String>,
    /// Whether this node advertises its topology to other nodes.
    pub relay: bool,
    /// Worker threads draining listener callback queues.
    pub callback_workers: usize,
    /// Log full knowledge snapshots on every change.
    pub verbose_logging: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            relay: false,
            callback_workers: default_callback_workers(),
            verbose_logging: false,
        }
    }
}

impl NodeConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: NodeConfig =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::ConfigIo {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_json_str(&content)?;
        tracing::debug!(path = %path.display(), ?config, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.callback_workers == 0 {
            return Err(Error::InvalidConfig(
                "callback_workers must be at least 1".to_string(),
            ));
        }
        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "display_name must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
