//! Show the effective configuration

use anyhow::Result;
use wabbit_bridge_core::BridgeConfig;

/// Execute the config command
pub fn execute(config: &BridgeConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
