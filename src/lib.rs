//! # chart-repo
//!
//! Mirrors Helm chart repositories into a document catalog. A sync run
//! downloads a repository's `index.yaml`, stores one document per chart,
//! removes charts that disappeared upstream and imports each chart's icon
//! plus the README, values and schema of every version.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chart_repo::{ChartRepoConfig, ChartRepoSyncer, SyncOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ChartRepoConfig::load().await?;
//!     let syncer = ChartRepoSyncer::from_config(&config).await?;
//!
//!     match syncer
//!         .sync_repo("stable", "https://charts.example.com", None)
//!         .await?
//!     {
//!         SyncOutcome::Skipped { .. } => println!("nothing changed"),
//!         SyncOutcome::Synced { charts, report, .. } => {
//!             println!("{charts} charts, {} failed jobs", report.failures.len())
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! - [`index`] fetches and parses repository indexes
//! - [`catalog`] maps records onto a [`store::DocumentStore`]
//! - [`assets`] imports icons and chart files, one job at a time
//! - [`scheduler`] runs asset jobs on a two-phase worker pool
//! - [`sync`] ties everything together

pub mod assets;
pub mod catalog;
pub mod checksum;
pub mod config;
pub mod error;
pub mod http;
pub mod index;
pub mod models;
pub mod scheduler;
pub mod store;
pub mod sync;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "cli")]
pub mod cli_error;

#[cfg(feature = "cli")]
pub mod output;

// Re-export main types
pub use assets::{AssetImporter, FilesOutcome, IconOutcome};
pub use catalog::{Catalog, DeleteSummary, ImportSummary};
pub use checksum::{ChecksumGate, RepoChecksum};
pub use config::{ChartRepoConfig, HttpConfig, StorageBackend, StorageConfig, SyncSettings};
pub use error::{ChartRepoError, Result};
pub use http::NetClient;
pub use models::{Chart, ChartFiles, ChartVersion, ImportChartFilesJob, Maintainer, Repo, RepoCheck};
pub use scheduler::{AssetJobs, ImportReport, ImportScheduler, JobFailure, JobKind};
pub use store::{Collection, DocumentStore, Filter, MemoryStore, SqliteStore, WriteModel};
pub use sync::{ChartRepoSyncer, SyncOutcome};
