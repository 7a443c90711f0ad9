//! Catalog operations on top of a [`DocumentStore`]
//!
//! The catalog owns the mapping between the records of
//! [`crate::models`] and the store's collections.

use crate::error::{ChartRepoError, IndexError, Result, StorageError};
use crate::models::{Chart, ChartFiles, Repo, RepoCheck, base64_bytes};
use crate::store::{Collection, DocumentStore, Filter, WriteModel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Document written and discarded by the readiness probe
const READINESS_PROBE: &str = "pi";

/// Counts of an [`Catalog::import_charts`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub upserted: u64,
    pub replaced: u64,
    pub pruned: u64,
}

/// Counts of a [`Catalog::delete_repo`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub charts: u64,
    pub chart_files: u64,
    pub checks: u64,
}

/// Typed access to the catalog collections.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn DocumentStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Verifies that the store accepts writes by inserting and discarding a
    /// probe document.
    pub async fn check_ready(&self) -> Result<()> {
        let id = self
            .store
            .insert_one(
                Collection::Numbers,
                json!({ "name": READINESS_PROBE, "value": std::f64::consts::PI }),
            )
            .await
            .map_err(|e| StorageError::NotReady {
                message: e.to_string(),
            })?;
        self.store
            .delete_many(Collection::Numbers, &Filter::by_id(id))
            .await?;
        debug!("Document store is ready");
        Ok(())
    }

    /// Replaces the chart set of a repository.
    ///
    /// Every chart is upserted by id, then charts of the repository missing
    /// from `charts` are deleted, in one ordered bulk write. An empty chart
    /// list is rejected so that a bad index never wipes a repository.
    #[instrument(name = "catalog.import_charts", skip(self, charts), fields(repo = %repo.name, count = charts.len()))]
    pub async fn import_charts(&self, repo: &Repo, charts: &[Chart]) -> Result<ImportSummary> {
        if charts.is_empty() {
            return Err(IndexError::EmptyIndex {
                repo: repo.name.clone(),
            }
            .into());
        }

        let mut ids = Vec::with_capacity(charts.len());
        let mut models = Vec::with_capacity(charts.len() + 1);
        for chart in charts {
            ids.push(chart.id.clone());
            models.push(WriteModel::ReplaceOne {
                filter: Filter::by_id(chart.id.clone()),
                replacement: to_document(chart)?,
                upsert: true,
            });
        }
        models.push(WriteModel::DeleteMany {
            filter: Filter::by_repo(repo.name.clone()).excluding_ids(ids),
        });

        let result = self.store.bulk_write(Collection::Packages, models).await?;
        let summary = ImportSummary {
            upserted: result.upserted,
            replaced: result.matched,
            pruned: result.deleted,
        };
        info!(
            upserted = summary.upserted,
            replaced = summary.replaced,
            pruned = summary.pruned,
            "Imported charts"
        );
        Ok(summary)
    }

    /// Stores the processed icon of a chart without touching other fields.
    pub async fn update_icon(&self, chart_id: &str, icon: &[u8], content_type: &str) -> Result<()> {
        let result = self
            .store
            .update_one(
                Collection::Packages,
                &Filter::by_id(chart_id),
                json!({
                    "raw_icon": base64_bytes::encode(icon),
                    "icon_content_type": content_type,
                }),
                false,
            )
            .await?;

        if result.matched == 0 {
            return Err(StorageError::DocumentNotFound {
                collection: Collection::Packages.to_string(),
                id: chart_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub async fn find_chart(&self, chart_id: &str) -> Result<Option<Chart>> {
        self.find_typed(Collection::Packages, &Filter::by_id(chart_id))
            .await
    }

    /// All charts of a repository, ordered by id.
    pub async fn list_charts(&self, repo_name: &str) -> Result<Vec<Chart>> {
        let docs = self
            .store
            .find_many(Collection::Packages, &Filter::by_repo(repo_name))
            .await?;
        docs.into_iter().map(from_document).collect()
    }

    /// Whether files with this id were already extracted from an archive
    /// with the given digest.
    pub async fn has_chart_files(&self, files_id: &str, digest: &str) -> Result<bool> {
        Ok(self
            .store
            .find_one(
                Collection::PackageAssets,
                &Filter::by_id(files_id).with_digest(digest),
            )
            .await?
            .is_some())
    }

    pub async fn find_chart_files(&self, files_id: &str) -> Result<Option<ChartFiles>> {
        self.find_typed(Collection::PackageAssets, &Filter::by_id(files_id))
            .await
    }

    /// Upserts every field of `files` onto the document with its id.
    pub async fn upsert_chart_files(&self, files: &ChartFiles) -> Result<()> {
        let mut doc = to_document(files)?;
        if let Value::Object(map) = &mut doc {
            map.remove("_id");
        }
        self.store
            .update_one(
                Collection::PackageAssets,
                &Filter::by_id(files.id.clone()),
                doc,
                true,
            )
            .await?;
        Ok(())
    }

    pub async fn find_repo_check(&self, repo_name: &str) -> Result<Option<RepoCheck>> {
        self.find_typed(Collection::PackageCheck, &Filter::by_id(repo_name))
            .await
    }

    /// Records the checksum of the last fully processed index of a
    /// repository.
    pub async fn update_last_check(
        &self,
        repo_name: &str,
        checksum: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.store
            .update_one(
                Collection::PackageCheck,
                &Filter::by_id(repo_name),
                json!({ "last_update": now, "checksum": checksum }),
                true,
            )
            .await?;
        Ok(())
    }

    /// Removes every chart, chart file and checkpoint of a repository.
    #[instrument(name = "catalog.delete_repo", skip(self))]
    pub async fn delete_repo(&self, repo_name: &str) -> Result<DeleteSummary> {
        let charts = self
            .store
            .delete_many(Collection::Packages, &Filter::by_repo(repo_name))
            .await?;
        let chart_files = self
            .store
            .delete_many(Collection::PackageAssets, &Filter::by_repo(repo_name))
            .await?;
        let checks = self
            .store
            .delete_many(Collection::PackageCheck, &Filter::by_id(repo_name))
            .await?;

        info!(charts, chart_files, checks, "Deleted repository");
        Ok(DeleteSummary {
            charts,
            chart_files,
            checks,
        })
    }

    async fn find_typed<T: DeserializeOwned>(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<T>> {
        self.store
            .find_one(collection, filter)
            .await?
            .map(from_document)
            .transpose()
    }
}

fn to_document<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(ChartRepoError::from)
}

fn from_document<T: DeserializeOwned>(doc: Value) -> Result<T> {
    serde_json::from_value(doc).map_err(|e| {
        StorageError::InvalidDocument {
            message: e.to_string(),
        }
        .into()
    })
}
