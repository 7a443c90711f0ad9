//! Per-chart asset import: icons and chart files
//!
//! Each call handles exactly one job and reports its own error; callers
//! decide whether a failed job matters.

pub mod files;
pub mod icon;

use crate::catalog::Catalog;
use crate::error::{AssetError, Result};
use crate::http::NetClient;
use crate::models::{Chart, ChartFiles, ChartVersion, Repo, chart_files_id};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, instrument};

/// Result of an icon job that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconOutcome {
    Imported { content_type: String },
    /// The chart declares no icon
    NoIcon,
}

/// Result of a chart files job that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilesOutcome {
    Imported { missing: Vec<String> },
    /// Files for this digest are already stored
    UpToDate,
}

/// Downloads icons and chart archives and writes the results to the
/// catalog.
#[derive(Clone)]
pub struct AssetImporter {
    net: NetClient,
    catalog: Catalog,
    icon_size: u32,
}

impl AssetImporter {
    pub fn new(net: NetClient, catalog: Catalog, icon_size: u32) -> Self {
        Self {
            net,
            catalog,
            icon_size,
        }
    }

    /// Fetches the icon of `chart`, normalizes raster images to PNG and
    /// stores it on the chart document.
    #[instrument(name = "assets.icon", skip(self, chart), fields(chart = %chart.id))]
    pub async fn fetch_and_import_icon(&self, chart: &Chart) -> Result<IconOutcome> {
        if chart.icon.trim().is_empty() {
            info!("Icon not found");
            return Ok(IconOutcome::NoIcon);
        }

        let url = chart.icon.trim();
        let response = self
            .net
            .get(url, chart.repo.authorization_header.as_deref())
            .await
            .map_err(|e| download_error(url, e))?;

        if response.status() != StatusCode::OK {
            return Err(AssetError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.bytes().await.map_err(|e| download_error(url, e))?;

        let (data, stored_type) = if icon::is_vector(&content_type) {
            (body.to_vec(), content_type)
        } else {
            let chart_name = chart.name.clone();
            let size = self.icon_size;
            let png = tokio::task::spawn_blocking(move || {
                icon::normalize_icon(&chart_name, &body, size)
            })
            .await??;
            (png, icon::PNG_CONTENT_TYPE.to_string())
        };

        self.catalog.update_icon(&chart.id, &data, &stored_type).await?;
        debug!(bytes = data.len(), content_type = %stored_type, "Stored icon");
        Ok(IconOutcome::Imported {
            content_type: stored_type,
        })
    }

    /// Extracts README, values and schema of one chart version.
    ///
    /// Nothing is downloaded when files with the same id and digest are
    /// already stored. Files missing from the archive are stored as empty
    /// strings.
    #[instrument(name = "assets.files", skip(self, repo, version), fields(repo = %repo.name, version = %version.version))]
    pub async fn fetch_and_import_files(
        &self,
        chart_name: &str,
        repo: &Repo,
        version: &ChartVersion,
    ) -> Result<FilesOutcome> {
        let files_id = chart_files_id(&repo.name, chart_name, &version.version);
        if self
            .catalog
            .has_chart_files(&files_id, &version.digest)
            .await?
        {
            debug!(id = %files_id, "Skipping existing files");
            return Ok(FilesOutcome::UpToDate);
        }

        let url = files::chart_tarball_url(repo, version)?;
        let response = self
            .net
            .get(&url, repo.authorization_header.as_deref())
            .await
            .map_err(|e| download_error(&url, e))?;

        if !response.status().is_success() {
            return Err(AssetError::DownloadError {
                url: url.clone(),
                message: format!("unexpected status {}", response.status()),
            }
            .into());
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| download_error(&url, e))?;

        let names = files::chart_file_names(chart_name);
        let wanted = names.to_vec();
        let mut extracted = tokio::task::spawn_blocking(move || {
            files::extract_files_from_tarball(&wanted, body.as_ref())
        })
        .await??;

        let [readme_name, values_name, schema_name] = names;
        let mut missing = Vec::new();
        let mut take = |name: &str| {
            extracted.remove(name).unwrap_or_else(|| {
                info!(file = name, "File not found in chart archive");
                missing.push(name.to_string());
                String::new()
            })
        };
        let readme = take(&readme_name);
        let values = take(&values_name);
        let schema = take(&schema_name);

        let chart_files = ChartFiles {
            id: files_id,
            readme,
            values,
            schema,
            repo: repo.clone(),
            digest: version.digest.clone(),
        };
        self.catalog.upsert_chart_files(&chart_files).await?;
        debug!(id = %chart_files.id, "Stored chart files");
        Ok(FilesOutcome::Imported { missing })
    }
}

fn download_error(url: &str, err: reqwest::Error) -> AssetError {
    AssetError::DownloadError {
        url: url.to_string(),
        message: err.to_string(),
    }
}
