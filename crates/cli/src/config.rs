//! Command line arguments and logging setup.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use corelib::config::NodeConfig;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

/// Inspect node ids and run a local node mesh.
#[derive(Debug, Parser)]
#[command(name = "nodemesh", version)]
pub struct CliConfig {
    /// JSON node configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level and log full knowledge snapshots.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub fn run(self) -> anyhow::Result<()> {
        self.init_logging();
        let node_config = self.node_config()?;
        let output = self.command.execute(&node_config)?;
        println!("{}", output);
        Ok(())
    }

    /// Reads the configuration file, or the defaults if none was given.
    pub fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut node_config = match &self.config {
            Some(path) => NodeConfig::load(path)
                .with_context(|| format!("loading node configuration from {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if self.verbose {
            node_config.verbose_logging = true;
        }
        Ok(node_config)
    }

    fn init_logging(&self) {
        let default_level = if self.verbose { "debug" } else { "info" };
        // Ignore the error if a subscriber is already installed.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let config = CliConfig::parse_from(["nodemesh", "--verbose", "demo", "--nodes", "5"]);
        assert!(config.verbose);
        assert!(matches!(config.command, Command::Demo { nodes: 5, relay: false }));
        assert!(config.node_config().unwrap().verbose_logging);
    }

    #[test]
    fn test_missing_config_file() {
        let config = CliConfig::parse_from(["nodemesh", "--config", "/nonexistent/node.json", "generate-id"]);
        let err = config.node_config().unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/node.json"));
    }
}
