pub mod app;
pub mod commands;

use anyhow::Result;
use std::path::Path;
use tracing::debug;
use wabbit_bridge_core::BridgeConfig;

pub use app::{Cli, Commands};

/// Load the configuration named on the command line, falling back to the environment
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let config = match path {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::from_env()?,
    };
    debug!(?config, "configuration loaded");
    Ok(config)
}
