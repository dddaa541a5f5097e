//! Registry configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Configuration shared by every registry kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RegistryConfig {
    /// Directory scanned for module sources.
    pub path: PathBuf,
    /// When set, a module with no explicit category is assigned the name
    /// of its immediate parent directory.
    pub automate_categories: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./modules"),
            automate_categories: false,
        }
    }
}

impl RegistryConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_automate_categories(mut self, enabled: bool) -> Self {
        self.automate_categories = enabled;
        self
    }
}

/// Configuration for a command registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CommandConfig {
    pub registry: RegistryConfig,
    /// Default command prefix. A per-command prefix or a computed default
    /// can be supplied programmatically.
    pub prefix: String,
    /// Accept the bot's mention token as a prefix.
    pub allow_mention: bool,
    /// Re-run dispatch for edited messages whose text changed.
    pub handle_edits: bool,
    /// Accepted but not enforced by the dispatch path.
    pub guild_only: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            prefix: "!".to_string(),
            allow_mention: false,
            handle_edits: false,
            guild_only: false,
        }
    }
}

impl CommandConfig {
    pub fn new(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            registry: RegistryConfig::new(path),
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_allow_mention(mut self, enabled: bool) -> Self {
        self.allow_mention = enabled;
        self
    }

    pub fn with_handle_edits(mut self, enabled: bool) -> Self {
        self.handle_edits = enabled;
        self
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_config_defaults() {
        let config = CommandConfig::default();
        assert_eq!(config.prefix, "!");
        assert!(!config.allow_mention);
        assert!(!config.handle_edits);
        assert!(!config.guild_only);
        assert!(!config.registry.automate_categories);
    }

    #[test]
    fn command_config_from_yaml() {
        let yaml = r#"
registry:
  path: ./commands
  automate-categories: true
prefix: "?"
allow-mention: true
"#;
        let config: CommandConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.prefix, "?");
        assert!(config.allow_mention);
        assert!(!config.handle_edits);
        assert!(config.registry.automate_categories);
        assert_eq!(config.registry.path, PathBuf::from("./commands"));
    }
}
