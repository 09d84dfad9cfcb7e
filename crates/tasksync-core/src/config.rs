use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Environment variable overriding `server.api_base_url`.
pub const ENV_API_URL: &str = "TASKSYNC_API_URL";
/// Environment variable overriding `storage.data_dir`.
pub const ENV_DATA_DIR: &str = "TASKSYNC_DATA_DIR";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DATABASE_FILE: &str = "tasksync.db";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config.toml
    #[serde(skip)]
    pub config_dir: PathBuf,

    /// Remote task service
    pub server: ServerConfig,

    /// Local persistence
    pub storage: StorageConfig,

    /// Presentation preferences
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the task API, including the `/api` prefix
    pub api_base_url: String,

    /// Per-request timeout. Unset means requests wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the local SQLite mirror
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    /// Theme used when none was chosen interactively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark_mode: Option<bool>,
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tasksync")
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tasksync")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            server: ServerConfig {
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
                request_timeout_secs: None,
            },
            storage: StorageConfig {
                data_dir: default_data_dir(),
            },
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the user config directory, creating a default
    /// file if it doesn't exist, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&default_config_dir())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load `config.toml` from `config_dir`, writing defaults when missing.
    pub fn load_from(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");

        if !config_path.exists() {
            let config = Self {
                config_dir: config_dir.to_path_buf(),
                ..Self::default()
            };
            config.save()?;
            tracing::info!("Wrote default config to {}", config_path.display());
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let mut config: Config =
            toml::from_str(&contents).context("Failed to parse config file")?;
        config.config_dir = config_dir.to_path_buf();

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Apply `TASKSYNC_API_URL` / `TASKSYNC_DATA_DIR` overrides.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("API base URL overridden by {}", ENV_API_URL);
            self.server.api_base_url = url;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Data directory overridden by {}", ENV_DATA_DIR);
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.server.api_base_url, "server.api_base_url", &mut result);

        if self.server.request_timeout_secs == Some(0) {
            result.add_error(
                "server.request_timeout_secs",
                "Timeout must be greater than 0 (omit it to disable)",
            );
        }

        let data_dir = &self.storage.data_dir;
        if data_dir.exists() && !data_dir.is_dir() {
            result.add_error(
                "storage.data_dir",
                format!("Path is not a directory: {}", data_dir.display()),
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.scheme() == "http"
                    && !matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"))
                {
                    result.add_warning(
                        field_name,
                        "Credentials will be sent over plain http to a remote host",
                    );
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(self.config_dir.join("config.toml"), contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Path of the local SQLite mirror
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.server.api_base_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "server.api_base_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.server.api_base_url = "ftp://localhost:8080".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_plain_http_remote_host_is_warning() {
        let mut config = Config::default();
        config.server.api_base_url = "http://tasks.example.com/api".to_string();
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "server.api_base_url"));
    }

    #[test]
    fn test_zero_timeout_is_error() {
        let mut config = Config::default();
        config.server.request_timeout_secs = Some(0);
        let result = config.validate();
        assert!(!result.is_valid());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            ENV_API_URL => Some("https://tasks.example.com/api".to_string()),
            ENV_DATA_DIR => Some("/tmp/tasksync-data".to_string()),
            _ => None,
        });
        assert_eq!(config.server.api_base_url, "https://tasks.example.com/api");
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/tasksync-data"));
    }

    #[test]
    fn test_empty_env_override_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.server.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_load_from_writes_default_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let first = Config::load_from(dir.path()).unwrap();
        assert!(dir.path().join("config.toml").exists());
        assert_eq!(first.server.api_base_url, DEFAULT_API_BASE_URL);

        std::fs::write(
            dir.path().join("config.toml"),
            r#"
[server]
api_base_url = "https://tasks.example.com/api"
request_timeout_secs = 10

[storage]
data_dir = "/var/lib/tasksync"

[ui]
dark_mode = true
"#,
        )
        .unwrap();

        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.server.request_timeout_secs, Some(10));
        assert_eq!(config.ui.dark_mode, Some(true));
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/tasksync/tasksync.db"));
        assert_eq!(config.config_dir, dir.path());
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
