//! Start-up configuration
//!
//! Read from an optional YAML file, then overridden by environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/paladin.yaml";
pub const CONFIG_PATH_ENV: &str = "PALADIN_CONFIG";
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";
pub const DATA_FILE_ENV: &str = "PALADIN_DATA_FILE";
pub const LOG_DIR_ENV: &str = "PALADIN_LOG_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("DISCORD_TOKEN is not set and no discord_token is configured")]
    MissingToken,
}

/// Bot settings
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BotConfig {
    pub discord_token: Option<String>,
    pub data_file: PathBuf,
    pub log_dir: PathBuf,
    pub unmute_grace_secs: u64,
    pub auto_delete_interval_secs: u64,
    pub register_globally: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            discord_token: None,
            data_file: PathBuf::from("data/store.yaml"),
            log_dir: PathBuf::from("logs"),
            unmute_grace_secs: 10,
            auto_delete_interval_secs: 60,
            register_globally: true,
        }
    }
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("discord_token", &self.discord_token.as_ref().map(|_| "<redacted>"))
            .field("data_file", &self.data_file)
            .field("log_dir", &self.log_dir)
            .field("unmute_grace_secs", &self.unmute_grace_secs)
            .field("auto_delete_interval_secs", &self.auto_delete_interval_secs)
            .field("register_globally", &self.register_globally)
            .finish()
    }
}

impl BotConfig {
    /// Load the config file named by `PALADIN_CONFIG` (or the default path) and
    /// apply environment overrides. A missing file means defaults.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| env::var(name).ok());
        Ok(config)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// # Errors
    /// Returns an error if `content` is not a valid config document.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply environment overrides, reading variables through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.discord_token = Some(token);
        }
        if let Some(data_file) = lookup(DATA_FILE_ENV) {
            self.data_file = PathBuf::from(data_file);
        }
        if let Some(log_dir) = lookup(LOG_DIR_ENV) {
            self.log_dir = PathBuf::from(log_dir);
        }
    }

    /// # Errors
    /// Returns [`ConfigError::MissingToken`] when no token was configured.
    pub fn token(&self) -> Result<&str, ConfigError> {
        self.discord_token.as_deref().ok_or(ConfigError::MissingToken)
    }

    /// Grace period for mutes whose deadline passed while the bot was offline
    #[must_use]
    pub fn unmute_grace(&self) -> chrono::Duration {
        i64::try_from(self.unmute_grace_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(crate::scheduler::DEFAULT_UNMUTE_GRACE)
    }

    #[must_use]
    pub fn auto_delete_interval(&self) -> Duration {
        Duration::from_secs(self.auto_delete_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.data_file, PathBuf::from("data/store.yaml"));
        assert_eq!(config.unmute_grace(), chrono::Duration::seconds(10));
        assert_eq!(config.auto_delete_interval(), Duration::from_secs(60));
        assert!(config.register_globally);
        assert!(matches!(config.token(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = BotConfig::from_yaml("log_dir: /var/log/paladin\nregister_globally: false\n").unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/var/log/paladin"));
        assert!(!config.register_globally);
        assert_eq!(config.unmute_grace_secs, 10);

        assert_eq!(BotConfig::from_yaml("").unwrap(), BotConfig::default());
        assert!(BotConfig::from_yaml("unmute_grace_secs: soon").is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<&str, &str> = [
            (TOKEN_ENV, "secret"),
            (DATA_FILE_ENV, "/tmp/store.yaml"),
        ]
        .into_iter()
        .collect();

        let mut config = BotConfig::default();
        config.apply_overrides(|name| vars.get(name).map(ToString::to_string));

        assert_eq!(config.token().unwrap(), "secret");
        assert_eq!(config.data_file, PathBuf::from("/tmp/store.yaml"));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_token_is_redacted() {
        let config = BotConfig {
            discord_token: Some("secret".to_string()),
            ..BotConfig::default()
        };
        assert!(!format!("{config:?}").contains("secret"));
    }
}
