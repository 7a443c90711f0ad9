//! Configuration management for the chart repository synchronizer

use crate::error::{ConfigError, Result, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default name of the configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "chart-repo.toml";

/// Main configuration structure.
///
/// Every section is optional in the TOML file; missing sections and keys
/// fall back to their defaults.
///
/// # Example
///
/// ```rust,no_run
/// use chart_repo::config::ChartRepoConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ChartRepoConfig::load().await?;
/// println!("Workers: {}", config.sync.workers);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChartRepoConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Settings of the shared HTTP client.
///
/// # Example
///
/// ```rust
/// use chart_repo::config::HttpConfig;
///
/// let config = HttpConfig {
///     timeout: 10,
///     user_agent_comment: Some("kubeapps/v1.0".to_string()),
///     ..HttpConfig::default()
/// };
/// assert_eq!(config.timeout, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Free-form comment appended to the User-Agent header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent_comment: Option<String>,

    /// Extra PEM bundle added to the trusted roots when the file exists
    #[serde(default = "default_additional_ca_file")]
    pub additional_ca_file: PathBuf,
}

/// Which [`crate::store::DocumentStore`] adapter backs the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Configuration of the catalog store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_connection_pool_size")]
    pub connection_pool_size: usize,
}

/// Tuning of the asset import phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Number of asset workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Icons are fit into a square of this size, in pixels
    #[serde(default = "default_icon_size")]
    pub icon_size: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            user_agent_comment: None,
            additional_ca_file: default_additional_ca_file(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_database_path(),
            connection_pool_size: default_connection_pool_size(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            icon_size: default_icon_size(),
        }
    }
}

impl ChartRepoConfig {
    /// Loads configuration from `chart-repo.toml` in the current directory,
    /// falling back to defaults when the file does not exist.
    ///
    /// Environment variable overrides are applied in both cases.
    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path()).await
    }

    /// Same as [`ChartRepoConfig::load`] with an explicit path.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path).await?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads and validates configuration from a TOML file.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use chart_repo::config::ChartRepoConfig;
    /// use std::path::Path;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ChartRepoConfig::from_file(Path::new("chart-repo.toml")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn from_file(path: &Path) -> Result<Self> {
        let path_clone = path.to_path_buf();
        let content = tokio::task::spawn_blocking(move || {
            std::fs::read_to_string(&path_clone)
                .map_err(|_| ConfigError::InvalidFile { path: path_clone })
        })
        .await??;

        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(CONFIG_FILE_NAME)
    }

    pub fn validate(&self) -> Result<()> {
        <Self as Validate>::validate(self).map_err(|e| e.into())
    }

    /// Applies environment variable overrides to the configuration.
    ///
    /// The following environment variables are supported:
    /// - `CHART_REPO_DATABASE_PATH` - Override the SQLite database path
    /// - `CHART_REPO_WORKERS` - Override the number of asset workers
    /// - `CHART_REPO_HTTP_TIMEOUT` - Override the HTTP timeout in seconds
    /// - `CHART_REPO_USER_AGENT_COMMENT` - Override the User-Agent comment
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CHART_REPO_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }

        if let Some(workers) = parse_env::<usize>("CHART_REPO_WORKERS") {
            self.sync.workers = workers;
        }

        if let Some(timeout) = parse_env::<u64>("CHART_REPO_HTTP_TIMEOUT") {
            self.http.timeout = timeout;
        }

        if let Ok(comment) = std::env::var("CHART_REPO_USER_AGENT_COMMENT") {
            self.http.user_agent_comment = Some(comment).filter(|c| !c.is_empty());
        }
    }

    /// Expand a leading `~` to the home directory
    fn expand_path(path: &Path) -> PathBuf {
        if path.starts_with("~")
            && let Some(home_dir) = dirs::home_dir()
        {
            let path_str = path.to_string_lossy();
            let expanded = path_str.replacen('~', home_dir.to_string_lossy().as_ref(), 1);
            return PathBuf::from(expanded);
        }
        path.to_path_buf()
    }

    /// Returns storage configuration with the database path expanded.
    pub fn get_expanded_storage_config(&self) -> StorageConfig {
        StorageConfig {
            database_path: Self::expand_path(&self.storage.database_path),
            ..self.storage.clone()
        }
    }

    /// Create test configuration
    #[cfg(test)]
    pub fn test_config(temp_dir: &Path) -> Self {
        Self {
            http: HttpConfig::default(),
            storage: StorageConfig {
                backend: StorageBackend::Sqlite,
                database_path: temp_dir.join("charts.db"),
                connection_pool_size: 4,
            },
            sync: SyncSettings::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

// Default value functions
fn default_timeout() -> u64 {
    10
}
fn default_additional_ca_file() -> PathBuf {
    PathBuf::from("/usr/local/share/ca-certificates/ca.crt")
}
fn default_database_path() -> PathBuf {
    let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home_dir.join(".chart-repo").join("charts.db")
}
fn default_connection_pool_size() -> usize {
    16
}
fn default_workers() -> usize {
    10
}
fn default_icon_size() -> u32 {
    160
}

impl Validate for ChartRepoConfig {
    type Error = ConfigError;

    fn validate(&self) -> std::result::Result<(), Self::Error> {
        self.http.validate()?;
        self.storage.validate()?;
        self.sync.validate()?;
        Ok(())
    }
}

impl Validate for HttpConfig {
    type Error = ConfigError;

    fn validate(&self) -> std::result::Result<(), Self::Error> {
        if self.timeout == 0 {
            return Err(ConfigError::ValidationFailed {
                message: "HTTP timeout must be greater than 0".to_string(),
            });
        }

        if self.timeout > 300 {
            return Err(ConfigError::ValidationFailed {
                message: "HTTP timeout should not exceed 300 seconds".to_string(),
            });
        }

        if let Some(comment) = &self.user_agent_comment
            && comment.chars().any(|c| c.is_control())
        {
            return Err(ConfigError::InvalidValue {
                key: "http.user_agent_comment".to_string(),
                value: comment.clone(),
            });
        }

        Ok(())
    }
}

impl Validate for StorageConfig {
    type Error = ConfigError;

    fn validate(&self) -> std::result::Result<(), Self::Error> {
        if self.backend == StorageBackend::Sqlite && self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed {
                message: "Database path cannot be empty".to_string(),
            });
        }

        if self.connection_pool_size == 0 {
            return Err(ConfigError::ValidationFailed {
                message: "Connection pool size must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Validate for SyncSettings {
    type Error = ConfigError;

    fn validate(&self) -> std::result::Result<(), Self::Error> {
        if self.workers == 0 {
            return Err(ConfigError::ValidationFailed {
                message: "Worker count must be greater than 0".to_string(),
            });
        }

        if self.workers > 128 {
            return Err(ConfigError::ValidationFailed {
                message: "Worker count should not exceed 128".to_string(),
            });
        }

        if self.icon_size == 0 {
            return Err(ConfigError::ValidationFailed {
                message: "Icon size must be greater than 0".to_string(),
            });
        }

        if self.icon_size > 4096 {
            return Err(ConfigError::ValidationFailed {
                message: "Icon size should not exceed 4096 pixels".to_string(),
            });
        }

        Ok(())
    }
}
