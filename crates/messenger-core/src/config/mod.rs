//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::{DatabaseConfig, default_database_path};

/// Messenger configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub limits: LimitsConfig,
    pub directory: DirectoryConfig,
    pub uploads: UploadsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file; the platform data directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

/// Validation limits for chats and messages, counted in characters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub group_name_min_chars: usize,
    pub group_name_max_chars: usize,
    pub max_text_chars: usize,
    pub max_attachments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Profile service URL; profiles resolve to blanks when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    pub public_base_url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            group_name_min_chars: 3,
            group_name_max_chars: 30,
            max_text_chars: 4096,
            max_attachments: 10,
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 5,
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            public_base_url: "http://localhost:8080/uploads".to_string(),
        }
    }
}

impl DatabaseSettings {
    /// Resolved database file path
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_database_path)
    }

    /// Connection settings for [`crate::storage::Database::new`]
    pub fn to_database_config(&self) -> DatabaseConfig {
        DatabaseConfig::with_path(self.resolved_path()).max_connections(self.max_connections)
    }
}

impl DirectoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl UploadsConfig {
    /// Resolved upload directory
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| match dirs::data_dir() {
            Some(data_dir) => data_dir.join("messenger").join("uploads"),
            None => PathBuf::from("uploads"),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() { None } else { Some(value.to_string()) }
}

fn display_optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "(not set)".to_string())
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("MESSENGER_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("messenger")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if there is no file
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let limits = &self.limits;
        if limits.group_name_min_chars == 0 {
            return Err(anyhow!("limits.group_name_min_chars must be at least 1"));
        }
        if limits.group_name_min_chars > limits.group_name_max_chars {
            return Err(anyhow!(
                "limits.group_name_min_chars ({}) exceeds limits.group_name_max_chars ({})",
                limits.group_name_min_chars,
                limits.group_name_max_chars
            ));
        }
        if limits.max_text_chars == 0 {
            return Err(anyhow!("limits.max_text_chars must be at least 1"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow!("database.max_connections must be at least 1"));
        }
        if self.directory.timeout_secs == 0 {
            return Err(anyhow!("directory.timeout_secs must be at least 1"));
        }
        if let Some(url) = &self.directory.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow!("directory.base_url must be an http(s) URL: {}", url));
            }
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Database settings
            "database.path" => Ok(self.database.resolved_path().display().to_string()),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),

            // Limits
            "limits.group_name_min_chars" => Ok(self.limits.group_name_min_chars.to_string()),
            "limits.group_name_max_chars" => Ok(self.limits.group_name_max_chars.to_string()),
            "limits.max_text_chars" => Ok(self.limits.max_text_chars.to_string()),
            "limits.max_attachments" => Ok(self.limits.max_attachments.to_string()),

            // Directory service
            "directory.base_url" => Ok(display_optional(self.directory.base_url.clone())),
            "directory.timeout_secs" => Ok(self.directory.timeout_secs.to_string()),

            // Uploads
            "uploads.dir" => Ok(self.uploads.resolved_dir().display().to_string()),
            "uploads.public_base_url" => Ok(self.uploads.public_base_url.clone()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `messenger config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    ///
    /// An empty value clears optional settings back to their default.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut updated = self.clone();
        match key {
            "database.path" => updated.database.path = optional(value).map(PathBuf::from),
            "database.max_connections" => {
                updated.database.max_connections = parse_number(key, value)?;
            }

            "limits.group_name_min_chars" => {
                updated.limits.group_name_min_chars = parse_number(key, value)?;
            }
            "limits.group_name_max_chars" => {
                updated.limits.group_name_max_chars = parse_number(key, value)?;
            }
            "limits.max_text_chars" => updated.limits.max_text_chars = parse_number(key, value)?,
            "limits.max_attachments" => updated.limits.max_attachments = parse_number(key, value)?,

            "directory.base_url" => updated.directory.base_url = optional(value),
            "directory.timeout_secs" => {
                updated.directory.timeout_secs = parse_number(key, value)?;
            }

            "uploads.dir" => updated.uploads.dir = optional(value).map(PathBuf::from),
            "uploads.public_base_url" => {
                updated.uploads.public_base_url = optional(value)
                    .ok_or_else(|| anyhow!("uploads.public_base_url cannot be empty"))?;
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `messenger config list` to see available keys.",
                    key
                ));
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "database.path",
            "database.max_connections",
            "limits.group_name_min_chars",
            "limits.group_name_max_chars",
            "limits.max_text_chars",
            "limits.max_attachments",
            "directory.base_url",
            "directory.timeout_secs",
            "uploads.dir",
            "uploads.public_base_url",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        Self::reset_at(&Self::config_path()?)
    }

    /// Reset the configuration stored at `path` to defaults
    pub fn reset_at(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
