//! Repository sync orchestration
//!
//! A sync run validates the repository URL, probes the store, fetches the
//! index and stops early when its checksum matches the last successful run.
//! Otherwise it replaces the chart set of the repository, imports icons and
//! chart files through the worker pool and finally records the checksum.

use crate::assets::AssetImporter;
use crate::catalog::{Catalog, DeleteSummary};
use crate::checksum::{ChecksumGate, RepoChecksum};
use crate::config::{ChartRepoConfig, SyncSettings};
use crate::error::Result;
use crate::http::NetClient;
use crate::index::{charts_from_index, fetch_repo_index, parse_repo_index, parse_repo_url};
use crate::models::Repo;
use crate::scheduler::{ImportReport, ImportScheduler};
use crate::store::{DocumentStore, open_store};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// How a sync run ended
#[derive(Debug)]
pub enum SyncOutcome {
    /// The index was unchanged since the last successful run
    Skipped { checksum: RepoChecksum },
    /// The catalog was updated from the index
    Synced {
        charts: usize,
        checksum: RepoChecksum,
        report: ImportReport,
    },
}

impl SyncOutcome {
    pub fn checksum(&self) -> &RepoChecksum {
        match self {
            SyncOutcome::Skipped { checksum } | SyncOutcome::Synced { checksum, .. } => checksum,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped { .. })
    }
}

/// Entry point of the library.
///
/// # Example
///
/// ```rust,no_run
/// use chart_repo::config::ChartRepoConfig;
/// use chart_repo::sync::ChartRepoSyncer;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ChartRepoConfig::load().await?;
/// let syncer = ChartRepoSyncer::from_config(&config).await?;
/// let outcome = syncer
///     .sync_repo("stable", "https://charts.example.com", None)
///     .await?;
/// println!("Index checksum: {}", outcome.checksum());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChartRepoSyncer {
    catalog: Catalog,
    net: NetClient,
    settings: SyncSettings,
}

impl ChartRepoSyncer {
    pub fn new(store: Arc<dyn DocumentStore>, net: NetClient, settings: SyncSettings) -> Self {
        Self {
            catalog: Catalog::new(store),
            net,
            settings,
        }
    }

    /// Opens the configured store and HTTP client.
    pub async fn from_config(config: &ChartRepoConfig) -> Result<Self> {
        let store = open_store(&config.get_expanded_storage_config()).await?;
        let net = NetClient::new(&config.http).await?;
        Ok(Self::new(store, net, config.sync.clone()))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Synchronizes one repository into the catalog.
    ///
    /// Index, URL and store failures abort the run before the checksum is
    /// recorded. Individual icon or archive failures are only reported in
    /// the returned [`ImportReport`].
    #[instrument(name = "sync.repo", skip(self, repo_url, authorization_header), fields(repo = %repo_name))]
    pub async fn sync_repo(
        &self,
        repo_name: &str,
        repo_url: &str,
        authorization_header: Option<&str>,
    ) -> Result<SyncOutcome> {
        let start = Instant::now();
        let url = parse_repo_url(repo_url)?;
        self.catalog.check_ready().await?;

        let repo = Repo::new(repo_name, url.as_str())
            .with_authorization(authorization_header.map(str::to_string));
        let raw_index = fetch_repo_index(&self.net, &repo).await?;
        let checksum = RepoChecksum::compute(&raw_index);

        let gate = ChecksumGate::new(self.catalog.clone());
        if gate.should_skip(repo_name, &raw_index).await? {
            info!(checksum = %checksum, "Skipping repository since there are no updates");
            return Ok(SyncOutcome::Skipped { checksum });
        }

        let index = parse_repo_index(&raw_index)?;
        let charts = charts_from_index(&index, &repo);
        self.catalog.import_charts(&repo, &charts).await?;

        let importer = AssetImporter::new(
            self.net.clone(),
            self.catalog.clone(),
            self.settings.icon_size,
        );
        let report = ImportScheduler::new(self.settings.workers)
            .run(Arc::new(importer), &charts)
            .await?;

        gate.record_success(repo_name, &checksum, Utc::now()).await?;
        info!(
            charts = charts.len(),
            failures = report.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Stored repository update in cache"
        );

        Ok(SyncOutcome::Synced {
            charts: charts.len(),
            checksum,
            report,
        })
    }

    /// Removes a repository and everything imported from it.
    pub async fn delete_repo(&self, repo_name: &str) -> Result<DeleteSummary> {
        self.catalog.check_ready().await?;
        self.catalog.delete_repo(repo_name).await
    }
}
