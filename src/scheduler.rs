//! Two-phase asset import worker pool
//!
//! All workers first drain the icon queue, then the chart files queue. The
//! icon queue is closed before the first file job is offered, so no file job
//! starts while icon jobs are still waiting. File jobs are enqueued with the
//! latest version of every chart ahead of any historic version.

use crate::assets::{AssetImporter, FilesOutcome, IconOutcome};
use crate::error::{ChartRepoError, Result};
use crate::models::{Chart, ImportChartFilesJob};
use async_trait::async_trait;
use flume::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// The asset jobs a worker runs.
#[async_trait]
pub trait AssetJobs: Send + Sync {
    async fn import_icon(&self, chart: &Chart) -> Result<IconOutcome>;
    async fn import_files(&self, job: &ImportChartFilesJob) -> Result<FilesOutcome>;
}

#[async_trait]
impl AssetJobs for AssetImporter {
    async fn import_icon(&self, chart: &Chart) -> Result<IconOutcome> {
        self.fetch_and_import_icon(chart).await
    }

    async fn import_files(&self, job: &ImportChartFilesJob) -> Result<FilesOutcome> {
        self.fetch_and_import_files(&job.name, &job.repo, &job.chart_version)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Icon,
    Files,
}

/// A job that failed; the run continued without it
#[derive(Debug)]
pub struct JobFailure {
    pub kind: JobKind,
    pub job_id: String,
    pub error: ChartRepoError,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub icons_imported: usize,
    pub icons_missing: usize,
    pub files_imported: usize,
    pub files_up_to_date: usize,
    pub failures: Vec<JobFailure>,
    pub total_time: Duration,
}

impl ImportReport {
    fn merge(&mut self, other: ImportReport) {
        self.icons_imported += other.icons_imported;
        self.icons_missing += other.icons_missing;
        self.files_imported += other.files_imported;
        self.files_up_to_date += other.files_up_to_date;
        self.failures.extend(other.failures);
    }

    pub fn jobs_completed(&self) -> usize {
        self.icons_imported + self.icons_missing + self.files_imported + self.files_up_to_date
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs the icon and chart files jobs of one sync run.
pub struct ImportScheduler {
    workers: usize,
}

impl ImportScheduler {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// File jobs in submission order: the latest version of every chart,
    /// then all remaining versions.
    pub fn file_jobs(charts: &[Chart]) -> Vec<ImportChartFilesJob> {
        let job = |chart: &Chart, version: &crate::models::ChartVersion| ImportChartFilesJob {
            name: chart.name.clone(),
            repo: chart.repo.clone(),
            chart_version: version.clone(),
        };

        let latest = charts
            .iter()
            .filter_map(|chart| chart.chart_versions.first().map(|v| job(chart, v)));
        let historic = charts
            .iter()
            .flat_map(|chart| chart.chart_versions.iter().skip(1).map(move |v| job(chart, v)));
        latest.chain(historic).collect()
    }

    /// Processes every job and waits for all of them.
    ///
    /// Job errors are collected into the report and never abort the run.
    pub async fn run(&self, jobs: Arc<dyn AssetJobs>, charts: &[Chart]) -> Result<ImportReport> {
        let start = Instant::now();
        let (icon_tx, icon_rx) = flume::bounded::<Chart>(self.workers);
        let (files_tx, files_rx) = flume::bounded::<ImportChartFilesJob>(self.workers);

        let handles: Vec<JoinHandle<ImportReport>> = (0..self.workers)
            .map(|worker_id| {
                tokio::spawn(Self::worker(
                    worker_id,
                    jobs.clone(),
                    icon_rx.clone(),
                    files_rx.clone(),
                ))
            })
            .collect();
        drop(icon_rx);
        drop(files_rx);

        for chart in charts {
            if icon_tx.send_async(chart.clone()).await.is_err() {
                break;
            }
        }
        drop(icon_tx);

        for job in Self::file_jobs(charts) {
            if files_tx.send_async(job).await.is_err() {
                break;
            }
        }
        drop(files_tx);

        let mut report = ImportReport::default();
        for (worker_id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(worker_report) => report.merge(worker_report),
                Err(e) => {
                    error!(worker_id, error = %e, "Import worker aborted");
                    report.failures.push(JobFailure {
                        kind: JobKind::Files,
                        job_id: format!("worker-{worker_id}"),
                        error: e.into(),
                    });
                }
            }
        }
        report.total_time = start.elapsed();

        info!(
            icons = report.icons_imported,
            files = report.files_imported,
            up_to_date = report.files_up_to_date,
            failures = report.failures.len(),
            elapsed_ms = report.total_time.as_millis() as u64,
            "Asset import finished"
        );
        Ok(report)
    }

    async fn worker(
        worker_id: usize,
        jobs: Arc<dyn AssetJobs>,
        icons: Receiver<Chart>,
        files: Receiver<ImportChartFilesJob>,
    ) -> ImportReport {
        let mut report = ImportReport::default();

        while let Ok(chart) = icons.recv_async().await {
            match jobs.import_icon(&chart).await {
                Ok(IconOutcome::Imported { .. }) => report.icons_imported += 1,
                Ok(IconOutcome::NoIcon) => report.icons_missing += 1,
                Err(e) => {
                    error!(worker_id, chart = %chart.id, error = %e, "Failed to import icon");
                    report.failures.push(JobFailure {
                        kind: JobKind::Icon,
                        job_id: chart.id.clone(),
                        error: e,
                    });
                }
            }
        }
        debug!(worker_id, "Icon queue drained");

        while let Ok(job) = files.recv_async().await {
            match jobs.import_files(&job).await {
                Ok(FilesOutcome::Imported { .. }) => report.files_imported += 1,
                Ok(FilesOutcome::UpToDate) => report.files_up_to_date += 1,
                Err(e) => {
                    let job_id = job.id();
                    error!(worker_id, job = %job_id, error = %e, "Failed to import chart files");
                    report.failures.push(JobFailure {
                        kind: JobKind::Files,
                        job_id,
                        error: e,
                    });
                }
            }
        }
        debug!(worker_id, "Files queue drained");

        report
    }
}
