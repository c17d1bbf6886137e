//! CLI configuration
//!
//! Read from `contramock.toml` in the working directory, or from the file
//! given with `--config`.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "contramock.toml";

/// Configuration for the contramock CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracing filter used when `RUST_LOG` is unset and `--verbose` is off.
    pub log_filter: String,

    /// Variables injected into every schema under `vars`.
    pub vars: IndexMap<String, Json>,

    /// Definitions registered before compiling, as `name = "schema"`.
    /// Registered in file order, so later types may refer to earlier ones.
    pub types: IndexMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            vars: IndexMap::new(),
            types: IndexMap::new(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load `path`, or `contramock.toml` if it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(CONFIG_FILE), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config: {}", path.display()))
    }
}
