//! Runtime configuration loaded from `karp.toml`.
//!
//! Every setting has a default, so an absent file is not an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KarpConfig {
    pub query: QuerySettings,
    pub resources: ResourceSettings,
    pub logging: LoggingSettings,
}

/// Limits and defaults applied to compiled queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Maximum nesting depth of a parsed query.
    pub max_depth: usize,
    /// Upper bound for `from + size`.
    pub max_result_window: usize,
    pub default_size: usize,
    pub lexicon_stats: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_result_window: 10_000,
            default_size: 25,
            lexicon_stats: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    /// Directory holding one configuration file per resource.
    pub dir: PathBuf,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("resources"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl KarpConfig {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML for this shape.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load the configuration at `path`, falling back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }
}
