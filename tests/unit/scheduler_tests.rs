//! Worker pool ordering and failure isolation tests

use crate::common::*;
use async_trait::async_trait;
use chart_repo::assets::{FilesOutcome, IconOutcome};
use chart_repo::error::{AssetError, Result};
use chart_repo::models::{Chart, ImportChartFilesJob, Repo};
use chart_repo::scheduler::{AssetJobs, ImportScheduler, JobKind};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Icon(String),
    Files(String),
}

/// Records every job and fails the ones whose id is listed.
#[derive(Default)]
struct RecordingJobs {
    events: Mutex<Vec<Event>>,
    failing: Vec<String>,
}

impl RecordingJobs {
    fn failing(ids: &[&str]) -> Self {
        Self {
            events: Mutex::new(vec![]),
            failing: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn fail_if_listed(&self, id: &str) -> Result<()> {
        if self.failing.iter().any(|f| f == id) {
            return Err(AssetError::DownloadError {
                url: id.to_string(),
                message: "boom".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl AssetJobs for RecordingJobs {
    async fn import_icon(&self, chart: &Chart) -> Result<IconOutcome> {
        self.events.lock().unwrap().push(Event::Icon(chart.id.clone()));
        tokio::task::yield_now().await;
        self.fail_if_listed(&chart.id)?;
        Ok(IconOutcome::NoIcon)
    }

    async fn import_files(&self, job: &ImportChartFilesJob) -> Result<FilesOutcome> {
        self.events.lock().unwrap().push(Event::Files(job.id()));
        tokio::task::yield_now().await;
        self.fail_if_listed(&job.id())?;
        Ok(FilesOutcome::Imported { missing: vec![] })
    }
}

fn charts() -> Vec<Chart> {
    let repo = Repo::new("stable", "http://charts.example.com/");
    vec![
        sample_chart(&repo, "apache", &["1.1.0", "1.0.0"]),
        sample_chart(&repo, "redis", &["2.0.0"]),
        sample_chart(&repo, "wordpress", &["0.3.0", "0.2.0", "0.1.0"]),
    ]
}

#[test]
fn test_latest_versions_are_submitted_first() {
    let ids: Vec<String> = ImportScheduler::file_jobs(&charts())
        .iter()
        .map(|job| job.id())
        .collect();
    assert_eq!(
        ids,
        vec![
            "stable/apache-1.1.0",
            "stable/redis-2.0.0",
            "stable/wordpress-0.3.0",
            "stable/apache-1.0.0",
            "stable/wordpress-0.2.0",
            "stable/wordpress-0.1.0",
        ]
    );
}

#[tokio::test]
async fn test_icons_run_before_any_file_job() {
    let jobs = Arc::new(RecordingJobs::default());
    let report = ImportScheduler::new(3)
        .run(jobs.clone(), &charts())
        .await
        .unwrap();

    let events = jobs.events();
    assert_eq!(events.len(), 9);
    let last_icon = events
        .iter()
        .rposition(|e| matches!(e, Event::Icon(_)))
        .unwrap();
    let first_file = events
        .iter()
        .position(|e| matches!(e, Event::Files(_)))
        .unwrap();
    assert!(last_icon < first_file);

    assert_eq!(report.icons_missing, 3);
    assert_eq!(report.files_imported, 6);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_single_worker_keeps_submission_order() {
    let jobs = Arc::new(RecordingJobs::default());
    ImportScheduler::new(1)
        .run(jobs.clone(), &charts())
        .await
        .unwrap();

    let files: Vec<String> = jobs
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Files(id) => Some(id),
            Event::Icon(_) => None,
        })
        .collect();
    let expected: Vec<String> = ImportScheduler::file_jobs(&charts())
        .iter()
        .map(|job| job.id())
        .collect();
    assert_eq!(files, expected);
}

#[tokio::test]
async fn test_failed_jobs_do_not_stop_the_run() {
    let jobs = Arc::new(RecordingJobs::failing(&[
        "stable/redis",
        "stable/wordpress-0.2.0",
    ]));
    let report = ImportScheduler::new(2)
        .run(jobs.clone(), &charts())
        .await
        .unwrap();

    assert_eq!(jobs.events().len(), 9);
    assert_eq!(report.jobs_completed(), 7);
    assert_eq!(report.failures.len(), 2);

    let mut failed: Vec<_> = report
        .failures
        .iter()
        .map(|f| (f.kind, f.job_id.as_str()))
        .collect();
    failed.sort_by_key(|(_, id)| id.to_string());
    assert_eq!(
        failed,
        vec![
            (JobKind::Icon, "stable/redis"),
            (JobKind::Files, "stable/wordpress-0.2.0"),
        ]
    );
}

#[tokio::test]
async fn test_empty_chart_list_finishes() {
    let jobs = Arc::new(RecordingJobs::default());
    let report = ImportScheduler::new(4).run(jobs.clone(), &[]).await.unwrap();
    assert!(jobs.events().is_empty());
    assert_eq!(report.jobs_completed(), 0);
}
