//! Error types for the chart repository synchronizer

use thiserror::Error;

/// Main result type used throughout the crate.
///
/// # Example
///
/// ```rust
/// use chart_repo::error::Result;
///
/// fn example_operation() -> Result<String> {
///     Ok("Success".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, ChartRepoError>;

/// Main error type for the chart repository synchronizer.
///
/// Every error that can abort a sync run ends up here. Errors raised by a
/// single icon or archive job are reported through the worker pool instead
/// and never abort the run.
///
/// # Example
///
/// ```rust
/// use chart_repo::error::{ChartRepoError, IndexError};
///
/// let index_error = IndexError::EmptyIndex {
///     repo: "stable".to_string(),
/// };
/// let error: ChartRepoError = index_error.into();
/// assert!(error.to_string().contains("stable"));
/// ```
#[derive(Error, Debug)]
pub enum ChartRepoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors related to configuration loading, parsing, and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {path}")]
    InvalidFile { path: std::path::PathBuf },

    #[error("Invalid CA bundle {path}: {message}")]
    InvalidCaBundle {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors raised while fetching and interpreting a repository index.
///
/// All of these are fatal for the sync attempt that raised them.
///
/// # Example
///
/// ```rust
/// use chart_repo::error::IndexError;
///
/// let error = IndexError::RepoIndexRequestFailed {
///     url: "https://charts.example.com/index.yaml".to_string(),
///     status: 404,
/// };
/// println!("Index error: {}", error);
/// ```
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Invalid repository URL: {url}")]
    InvalidRepoUrl { url: String },

    #[error("Repository index request to {url} failed with status {status}")]
    RepoIndexRequestFailed { url: String, status: u16 },

    #[error("Failed to parse repository index: {message}")]
    IndexParseError { message: String },

    #[error("No charts in repository index for {repo}")]
    EmptyIndex { repo: String },
}

/// Errors raised by a single icon or archive import job.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Download of {url} failed: {message}")]
    DownloadError { url: String, message: String },

    #[error("{status} {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Archive could not be decoded: {message}")]
    ArchiveDecodeError { message: String },

    #[error("Unexpected end of archive: {message}")]
    UnexpectedEof { message: String },

    #[error("Failed to decode icon for {chart}: {message}")]
    IconDecodeError { chart: String, message: String },

    #[error("Failed to encode icon for {chart}: {message}")]
    IconEncodeError { chart: String, message: String },
}

/// Errors related to the document store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage initialization failed: {message}")]
    InitializationFailed { message: String },

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Document not found in {collection}: {id}")]
    DocumentNotFound { collection: String, id: String },

    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },

    #[error("Store readiness check failed: {message}")]
    NotReady { message: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::DatabaseError {
            message: err.to_string(),
        }
    }
}

/// Trait for validating configuration and data structures.
///
/// # Example
///
/// ```rust
/// use chart_repo::error::{ConfigError, Validate};
///
/// struct MyConfig {
///     url: String,
/// }
///
/// impl Validate for MyConfig {
///     type Error = ConfigError;
///
///     fn validate(&self) -> Result<(), Self::Error> {
///         if self.url.is_empty() {
///             Err(ConfigError::ValidationFailed {
///                 message: "URL cannot be empty".to_string(),
///             })
///         } else {
///             Ok(())
///         }
///     }
/// }
/// ```
pub trait Validate {
    type Error;
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}

impl ChartRepoError {
    /// Whether this error comes from a malformed repository URL.
    pub fn is_invalid_url(&self) -> bool {
        matches!(self, ChartRepoError::Index(IndexError::InvalidRepoUrl { .. }))
    }
}
