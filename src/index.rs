//! Repository index handling: URL validation, download, parsing and
//! conversion of index entries into catalog charts
//!
//! A repository index (`index.yaml`) maps chart names to the list of
//! published versions. After parsing, every version list is ordered latest
//! first so that the head of each list describes the chart.

use crate::error::{IndexError, Result};
use crate::http::NetClient;
use crate::models::{Chart, ChartVersion, Maintainer, Repo, chart_id};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};
use url::Url;

/// File name of the index below the repository URL
pub const INDEX_FILE_NAME: &str = "index.yaml";

/// Parsed repository index
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<IndexChartVersion>>,
    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,
}

/// One published version of a chart as listed in the index
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexChartVersion {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub maintainers: Vec<IndexMaintainer>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deprecated: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexMaintainer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Validates a repository URL.
///
/// Surrounding whitespace is ignored. The URL must be absolute and carry a
/// host.
///
/// ```rust
/// use chart_repo::index::parse_repo_url;
///
/// assert!(parse_repo_url(" https://charts.example.com/stable ").is_ok());
/// assert!(parse_repo_url("not-a-url").is_err());
/// assert!(parse_repo_url("https//google.com").is_err());
/// ```
pub fn parse_repo_url(repo_url: &str) -> std::result::Result<Url, IndexError> {
    let trimmed = repo_url.trim();
    let invalid = || IndexError::InvalidRepoUrl {
        url: repo_url.to_string(),
    };

    let url = Url::parse(trimmed).map_err(|_| invalid())?;
    if url.cannot_be_a_base() || url.host_str().is_none_or(str::is_empty) {
        return Err(invalid());
    }
    Ok(url)
}

/// Appends a relative path to the path of `base`, keeping query and
/// fragment untouched.
pub(crate) fn join_url_path(base: &Url, relative: &str) -> Url {
    let mut url = base.clone();
    let path = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        relative.trim_start_matches('/')
    );
    url.set_path(&path);
    url
}

/// URL of the index file of a repository
pub fn index_url(repo_url: &Url) -> Url {
    join_url_path(repo_url, INDEX_FILE_NAME)
}

/// Downloads the raw index of a repository.
///
/// Any status other than 200 is an [`IndexError::RepoIndexRequestFailed`].
#[instrument(name = "index.fetch", skip(client, repo), fields(repo = %repo.name))]
pub async fn fetch_repo_index(client: &NetClient, repo: &Repo) -> Result<Vec<u8>> {
    let base = parse_repo_url(&repo.url)?;
    let url = index_url(&base);
    debug!(url = %url, "Fetching repository index");

    let response = client
        .get(url.as_str(), repo.authorization_header.as_deref())
        .await?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(IndexError::RepoIndexRequestFailed {
            url: url.to_string(),
            status: response.status().as_u16(),
        }
        .into());
    }

    let body = response.bytes().await?;
    debug!(bytes = body.len(), "Fetched repository index");
    Ok(body.to_vec())
}

/// Parses raw index bytes and orders every version list latest first.
pub fn parse_repo_index(bytes: &[u8]) -> std::result::Result<IndexFile, IndexError> {
    let mut index: IndexFile =
        serde_yaml::from_slice(bytes).map_err(|e| IndexError::IndexParseError {
            message: e.to_string(),
        })?;
    sort_entries(&mut index);
    Ok(index)
}

/// Orders each version list latest first.
///
/// Versions that parse as semantic versions (an optional leading `v` is
/// accepted) come first in descending semver order. The remaining versions
/// follow, newest `created` first. The raw version string breaks ties.
pub fn sort_entries(index: &mut IndexFile) {
    for versions in index.entries.values_mut() {
        versions.sort_by(compare_latest_first);
    }
}

fn parse_semver(version: &str) -> Option<semver::Version> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    semver::Version::parse(trimmed).ok()
}

fn compare_latest_first(a: &IndexChartVersion, b: &IndexChartVersion) -> Ordering {
    let by_created = || b.created.cmp(&a.created);
    let by_string = || b.version.cmp(&a.version);

    match (parse_semver(&a.version), parse_semver(&b.version)) {
        (Some(va), Some(vb)) => vb.cmp(&va).then_with(by_created).then_with(by_string),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => by_created().then_with(by_string),
    }
}

/// Converts index entries into catalog charts.
///
/// Entries whose latest version is deprecated, and entries without any
/// version, are skipped.
pub fn charts_from_index(index: &IndexFile, repo: &Repo) -> Vec<Chart> {
    let mut charts = Vec::with_capacity(index.entries.len());
    for (name, versions) in &index.entries {
        let Some(latest) = versions.first() else {
            debug!(chart = %name, "Skipping chart without versions");
            continue;
        };
        if latest.deprecated {
            info!(chart = %name, "Skipping deprecated chart");
            continue;
        }
        charts.push(new_chart(name, versions, repo));
    }
    charts
}

/// Builds a chart from its ordered version list.
///
/// Descriptive metadata comes from the latest version. The chart name falls
/// back to the index key when the latest version omits it.
pub fn new_chart(key: &str, versions: &[IndexChartVersion], repo: &Repo) -> Chart {
    let latest = versions.first().cloned().unwrap_or_default();
    let name = if latest.name.is_empty() {
        key.to_string()
    } else {
        latest.name.clone()
    };

    Chart {
        id: chart_id(&repo.name, &name),
        name,
        repo: repo.clone(),
        description: latest.description,
        home: latest.home,
        keywords: latest.keywords,
        maintainers: latest
            .maintainers
            .into_iter()
            .map(|m| Maintainer {
                name: m.name,
                email: m.email,
            })
            .collect(),
        sources: latest.sources,
        icon: latest.icon,
        chart_versions: versions.iter().map(chart_version_from_index).collect(),
        raw_icon: None,
        icon_content_type: None,
    }
}

fn chart_version_from_index(entry: &IndexChartVersion) -> ChartVersion {
    ChartVersion {
        version: entry.version.clone(),
        app_version: entry.app_version.clone(),
        created: entry.created.unwrap_or_default(),
        digest: entry.digest.clone(),
        urls: entry.urls.clone(),
    }
}
