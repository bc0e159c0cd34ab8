//! Bridge configuration
//!
//! Selects the learning core, caps the number of open sessions and supplies
//! options prepended to every session's configuration string.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which learning core backs new sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CoreBackend {
    /// Built-in hashed linear learner
    #[default]
    Builtin,
    /// Core loaded from a dynamic library
    Native { library: PathBuf },
}

/// Main configuration for the bridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum number of sessions open at once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,

    /// Options prepended to every session's configuration string
    pub default_options: String,

    /// Learning core
    pub core: CoreBackend,
}

impl BridgeConfig {
    /// Environment variable naming a configuration file
    pub const ENV_VAR: &'static str = "WABBIT_BRIDGE_CONFIG";

    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }

    /// Load from the file named by [`Self::ENV_VAR`], or defaults when unset
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(Self::ENV_VAR) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Session configuration string with the default options in front
    pub fn options_for(&self, options: &str) -> String {
        join_options(&self.default_options, options)
    }
}

pub(crate) fn join_options(defaults: &str, options: &str) -> String {
    match (defaults.trim(), options.trim()) {
        ("", options) => options.to_string(),
        (defaults, "") => defaults.to_string(),
        (defaults, options) => format!("{defaults} {options}"),
    }
}
