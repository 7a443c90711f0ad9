//! Catalog records: charts, their versions, extracted chart files and
//! repository checkpoints
//!
//! These are the documents persisted through [`crate::store::DocumentStore`].
//! Field names follow the document layout of the catalog collections, with
//! `_id` as the primary key of every record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one upstream chart repository.
///
/// The authorization header is supplied by the caller for the duration of a
/// sync run and is never persisted.
///
/// # Example
///
/// ```rust
/// use chart_repo::models::Repo;
///
/// let repo = Repo::new("stable", "https://charts.example.com/");
/// assert!(repo.authorization_header.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub name: String,
    pub url: String,
    #[serde(skip)]
    pub authorization_header: Option<String>,
}

impl Repo {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            authorization_header: None,
        }
    }

    pub fn with_authorization(mut self, header: Option<String>) -> Self {
        self.authorization_header = header.filter(|h| !h.is_empty());
        self
    }
}

/// Maintainer of a chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Maintainer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Full catalog descriptor of a chart.
///
/// `chart_versions` keeps index order with the latest version first. The
/// raw icon is written separately by the icon worker and is dropped whenever
/// the chart document is replaced by a new sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub repo: Repo,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub maintainers: Vec<Maintainer>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub chart_versions: Vec<ChartVersion>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pub raw_icon: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_content_type: Option<String>,
}

impl Chart {
    /// The latest version of the chart, if the chart has any versions.
    pub fn latest_version(&self) -> Option<&ChartVersion> {
        self.chart_versions.first()
    }
}

/// Version information of a chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartVersion {
    pub version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// README, values and schema of one chart version.
///
/// `digest` is copied from the [`ChartVersion`] the files were extracted
/// from and gates re-extraction on later syncs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartFiles {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub readme: String,
    #[serde(default)]
    pub values: String,
    #[serde(default)]
    pub schema: String,
    pub repo: Repo,
    #[serde(default)]
    pub digest: String,
}

/// Last successfully processed state of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCheck {
    #[serde(rename = "_id")]
    pub id: String,
    pub last_update: DateTime<Utc>,
    pub checksum: String,
}

/// Work item for extracting the files of one chart version
#[derive(Debug, Clone)]
pub struct ImportChartFilesJob {
    pub name: String,
    pub repo: Repo,
    pub chart_version: ChartVersion,
}

impl ImportChartFilesJob {
    pub fn id(&self) -> String {
        chart_files_id(&self.repo.name, &self.name, &self.chart_version.version)
    }
}

/// `<repo>/<chart>`
pub fn chart_id(repo_name: &str, chart_name: &str) -> String {
    format!("{repo_name}/{chart_name}")
}

/// `<repo>/<chart>-<version>`
pub fn chart_files_id(repo_name: &str, chart_name: &str, version: &str) -> String {
    format!("{repo_name}/{chart_name}-{version}")
}

pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
