//! End-to-end sync runs against a mock chart repository

use crate::common::*;
use chart_repo::config::StorageBackend;
use chart_repo::error::{AssetError, ChartRepoError, IndexError};
use chart_repo::models::chart_files_id;
use chart_repo::store::{Collection, MemoryStore};
use chart_repo::{ChartRepoSyncer, SyncOutcome};
use image::GenericImageView;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

const CATALOG_COLLECTIONS: [Collection; 3] = [
    Collection::Packages,
    Collection::PackageAssets,
    Collection::PackageCheck,
];

fn catalog_writes(store: &MemoryStore) -> Vec<u64> {
    CATALOG_COLLECTIONS
        .iter()
        .map(|c| store.write_count(*c))
        .collect()
}

/// wordpress with two versions listed oldest first and an icon, apache
/// without icon or schema, and a deprecated chart.
fn stable_index(repo: &MockChartRepo) -> String {
    index_yaml(vec![
        chart_entry("wordpress", "0.1.0", "2024-01-01T00:00:00Z", "wordpress-0.1.0.tgz"),
        with_icon(
            chart_entry("wordpress", "0.2.0", "2024-02-01T00:00:00Z", "wordpress-0.2.0.tgz"),
            &repo.file_url("wordpress.png"),
        ),
        chart_entry(
            "apache",
            "1.0.0",
            "2024-01-01T00:00:00Z",
            &repo.file_url("archives/apache-1.0.0.tgz"),
        ),
        deprecated(chart_entry("old", "3.0.0", "2024-01-01T00:00:00Z", "old-3.0.0.tgz")),
    ])
}

async fn serve_stable(repo: &MockChartRepo) {
    repo.serve_index(&stable_index(repo)).await;
    repo.serve_icon("/wordpress.png", png_icon(320, 320), "image/png")
        .await;
    repo.serve_tarball("/wordpress-0.1.0.tgz", chart_tarball("wordpress"))
        .await;
    repo.serve_tarball("/wordpress-0.2.0.tgz", chart_tarball("wordpress"))
        .await;
    repo.serve_tarball(
        "/archives/apache-1.0.0.tgz",
        tarball(&[("apache/README.md", "# Apache"), ("apache/values.yaml", "a: 1")]),
    )
    .await;
}

/// Test a first sync of a repository
#[tokio::test]
async fn test_first_sync_imports_everything() {
    let repo = MockChartRepo::start().await;
    serve_stable(&repo).await;
    let store = memory_store();
    let syncer = memory_syncer(&store);

    let outcome = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();
    let SyncOutcome::Synced { charts, report, .. } = &outcome else {
        panic!("expected a full sync, got {outcome:?}");
    };
    assert_eq!(*charts, 2);
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.icons_imported, 1);
    assert_eq!(report.icons_missing, 1);
    assert_eq!(report.files_imported, 3);

    let catalog = syncer.catalog();
    let stored = catalog.list_charts("stable").await.unwrap();
    let ids: Vec<_> = stored.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["stable/apache", "stable/wordpress"]);

    let wordpress = &stored[1];
    assert_eq!(wordpress.latest_version().unwrap().version, "0.2.0");
    assert_eq!(wordpress.repo.url, format!("{}/", repo.url()));
    assert_eq!(wordpress.icon_content_type.as_deref(), Some("image/png"));
    let icon = image::load_from_memory(wordpress.raw_icon.as_deref().unwrap()).unwrap();
    assert_eq!(icon.dimensions(), (160, 160));
    assert!(stored[0].raw_icon.is_none());

    for version in ["0.1.0", "0.2.0"] {
        let files = catalog
            .find_chart_files(&chart_files_id("stable", "wordpress", version))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(files.readme, README);
        assert_eq!(files.values, VALUES);
        assert_eq!(files.schema, SCHEMA);
        assert_eq!(files.digest, digest_for("wordpress", version));
    }

    let apache = catalog
        .find_chart_files(&chart_files_id("stable", "apache", "1.0.0"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(apache.readme, "# Apache");
    assert_eq!(apache.values, "a: 1");
    assert!(apache.schema.is_empty());

    let check = catalog.find_repo_check("stable").await.unwrap().unwrap();
    assert_eq!(check.checksum, outcome.checksum().as_str());
    assert!(store.is_empty(Collection::Numbers));
}

/// Test that syncing an unchanged index performs no catalog writes
#[tokio::test]
async fn test_unchanged_index_is_skipped() {
    let repo = MockChartRepo::start().await;
    serve_stable(&repo).await;
    let store = memory_store();
    let syncer = memory_syncer(&store);

    let first = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();
    let writes = catalog_writes(&store);
    let archive_downloads = repo.request_count("/wordpress-0.1.0.tgz").await;

    let second = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();
    assert!(second.is_skipped());
    assert_eq!(second.checksum(), first.checksum());
    assert_eq!(catalog_writes(&store), writes);
    assert_eq!(
        repo.request_count("/wordpress-0.1.0.tgz").await,
        archive_downloads
    );
    assert_eq!(repo.request_count("/index.yaml").await, 2);
}

/// Test that a changed index prunes removed charts and only downloads new
/// archives
#[tokio::test]
async fn test_changed_index_prunes_and_gates_by_digest() {
    let repo = MockChartRepo::start().await;
    serve_stable(&repo).await;
    let store = memory_store();
    let syncer = memory_syncer(&store);
    syncer.sync_repo("stable", &repo.url(), None).await.unwrap();

    repo.reset().await;
    repo.serve_index(&index_yaml(vec![
        chart_entry("wordpress", "0.1.0", "2024-01-01T00:00:00Z", "wordpress-0.1.0.tgz"),
        chart_entry("wordpress", "0.2.0", "2024-02-01T00:00:00Z", "wordpress-0.2.0.tgz"),
        chart_entry("wordpress", "0.3.0", "2024-03-01T00:00:00Z", "wordpress-0.3.0.tgz"),
    ]))
    .await;
    repo.serve_tarball_expecting("/wordpress-0.3.0.tgz", chart_tarball("wordpress"), 1)
        .await;
    repo.serve_tarball_expecting("/wordpress-0.2.0.tgz", chart_tarball("wordpress"), 0)
        .await;
    repo.serve_tarball_expecting("/wordpress-0.1.0.tgz", chart_tarball("wordpress"), 0)
        .await;

    let outcome = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();
    let SyncOutcome::Synced { charts, report, .. } = outcome else {
        panic!("expected a full sync");
    };
    assert_eq!(charts, 1);
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.files_imported, 1);
    assert_eq!(report.files_up_to_date, 2);

    let catalog = syncer.catalog();
    assert!(catalog.find_chart("stable/apache").await.unwrap().is_none());
    let wordpress = catalog.find_chart("stable/wordpress").await.unwrap().unwrap();
    assert_eq!(wordpress.latest_version().unwrap().version, "0.3.0");
    assert!(wordpress.raw_icon.is_none());
}

/// Test that an archive whose digest changed is extracted again
#[tokio::test]
async fn test_changed_digest_reextracts_files() {
    let repo = MockChartRepo::start().await;
    let entry = chart_entry("redis", "2.0.0", "2024-01-01T00:00:00Z", "redis-2.0.0.tgz");
    repo.serve_index(&index_yaml(vec![entry.clone()])).await;
    repo.serve_tarball("/redis-2.0.0.tgz", chart_tarball("redis"))
        .await;
    let store = memory_store();
    let syncer = memory_syncer(&store);
    syncer.sync_repo("stable", &repo.url(), None).await.unwrap();

    repo.reset().await;
    repo.serve_index(&index_yaml(vec![with_digest(entry, "sha256-rebuilt")]))
        .await;
    repo.serve_tarball_expecting(
        "/redis-2.0.0.tgz",
        tarball(&[("redis/README.md", "rebuilt")]),
        1,
    )
    .await;

    syncer.sync_repo("stable", &repo.url(), None).await.unwrap();

    let files = syncer
        .catalog()
        .find_chart_files(&chart_files_id("stable", "redis", "2.0.0"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(files.readme, "rebuilt");
    assert_eq!(files.digest, "sha256-rebuilt");
    assert_eq!(store.len(Collection::PackageAssets), 1);
}

/// Test that an index without usable charts never wipes the repository
#[tokio::test]
async fn test_empty_index_keeps_existing_catalog() {
    let repo = MockChartRepo::start().await;
    serve_stable(&repo).await;
    let store = memory_store();
    let syncer = memory_syncer(&store);
    let first = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();

    repo.reset().await;
    repo.serve_index(&index_yaml(vec![deprecated(chart_entry(
        "wordpress",
        "9.9.9",
        "2025-01-01T00:00:00Z",
        "wordpress-9.9.9.tgz",
    ))]))
    .await;

    let err = syncer
        .sync_repo("stable", &repo.url(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChartRepoError::Index(IndexError::EmptyIndex { .. })
    ));

    let catalog = syncer.catalog();
    assert_eq!(catalog.list_charts("stable").await.unwrap().len(), 2);
    let check = catalog.find_repo_check("stable").await.unwrap().unwrap();
    assert_eq!(check.checksum, first.checksum().as_str());
}

/// Test that an unparsable index aborts the run before any catalog write
#[tokio::test]
async fn test_unparsable_index_is_rejected() {
    let repo = MockChartRepo::start().await;
    repo.serve_index("entries: [broken: yaml: here").await;
    let store = memory_store();
    let syncer = memory_syncer(&store);

    let err = syncer
        .sync_repo("stable", &repo.url(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChartRepoError::Index(IndexError::IndexParseError { .. })
    ));
    assert_eq!(catalog_writes(&store), vec![0, 0, 0]);
}

/// Test that a failing index request leaves no checkpoint
#[tokio::test]
async fn test_index_request_failure() {
    let repo = MockChartRepo::start().await;
    repo.serve_status("/index.yaml", 500).await;
    let store = memory_store();
    let syncer = memory_syncer(&store);

    let err = syncer
        .sync_repo("stable", &repo.url(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChartRepoError::Index(IndexError::RepoIndexRequestFailed { status: 500, .. })
    ));
    assert_eq!(catalog_writes(&store), vec![0, 0, 0]);
}

/// Test that a malformed URL is rejected before touching the store
#[tokio::test]
async fn test_invalid_repo_url() {
    let store = memory_store();
    let syncer = memory_syncer(&store);

    let err = syncer
        .sync_repo("stable", "https//google.com", None)
        .await
        .unwrap_err();
    assert!(err.is_invalid_url());
    assert_eq!(store.write_count(Collection::Numbers), 0);
    assert_eq!(catalog_writes(&store), vec![0, 0, 0]);
}

/// Test that failed asset jobs are reported without aborting the sync
#[tokio::test]
async fn test_asset_failures_are_isolated() {
    let repo = MockChartRepo::start().await;
    repo.serve_index(&stable_index(&repo)).await;
    repo.serve_status("/wordpress.png", 404).await;
    repo.serve_status("/wordpress-0.1.0.tgz", 500).await;
    repo.serve_tarball("/wordpress-0.2.0.tgz", chart_tarball("wordpress"))
        .await;
    repo.serve_tarball("/archives/apache-1.0.0.tgz", b"not a tarball".to_vec())
        .await;
    let store = memory_store();
    let syncer = memory_syncer(&store);

    let outcome = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();
    let SyncOutcome::Synced { report, .. } = &outcome else {
        panic!("expected a full sync");
    };
    assert_eq!(report.failures.len(), 3);
    assert_eq!(report.files_imported, 1);

    let catalog = syncer.catalog();
    assert!(
        catalog
            .find_chart_files(&chart_files_id("stable", "wordpress", "0.2.0"))
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        catalog
            .find_chart_files(&chart_files_id("stable", "wordpress", "0.1.0"))
            .await
            .unwrap()
            .is_none()
    );
    assert!(catalog.find_repo_check("stable").await.unwrap().is_some());
}

/// Test that a truncated archive stores nothing and is retried by the next
/// sync of a changed index
#[tokio::test]
async fn test_truncated_archive_is_retried() {
    let repo = MockChartRepo::start().await;
    let redis = chart_entry("redis", "2.0.0", "2024-01-01T00:00:00Z", "redis-2.0.0.tgz");
    let archive = chart_tarball("redis");
    repo.serve_index(&index_yaml(vec![redis.clone()])).await;
    repo.serve_tarball("/redis-2.0.0.tgz", archive[..archive.len() / 2].to_vec())
        .await;
    let store = memory_store();
    let syncer = memory_syncer(&store);

    let outcome = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();
    let SyncOutcome::Synced { report, .. } = &outcome else {
        panic!("expected a full sync");
    };
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].error,
        ChartRepoError::Asset(AssetError::UnexpectedEof { .. })
    ));
    assert!(store.is_empty(Collection::PackageAssets));

    repo.reset().await;
    repo.serve_index(&index_yaml(vec![
        redis,
        chart_entry("nginx", "1.0.0", "2024-01-01T00:00:00Z", "nginx-1.0.0.tgz"),
    ]))
    .await;
    repo.serve_tarball_expecting("/redis-2.0.0.tgz", archive.clone(), 1)
        .await;
    repo.serve_tarball("/nginx-1.0.0.tgz", chart_tarball("nginx"))
        .await;

    let outcome = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();
    let SyncOutcome::Synced { report, .. } = &outcome else {
        panic!("expected a full sync");
    };
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    let files = syncer
        .catalog()
        .find_chart_files(&chart_files_id("stable", "redis", "2.0.0"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(files.readme, README);
}

/// Test that the authorization header reaches index, icon and archive
/// requests
#[tokio::test]
async fn test_authorization_header_is_forwarded() {
    let repo = MockChartRepo::start().await;
    let auth = "Basic dXNlcjpwYXNz";
    let yaml = index_yaml(vec![with_icon(
        chart_entry("private", "1.0.0", "2024-01-01T00:00:00Z", "private-1.0.0.tgz"),
        &repo.file_url("private.svg"),
    )]);

    Mock::given(method("GET"))
        .and(path("/index.yaml"))
        .and(header("authorization", auth))
        .respond_with(ResponseTemplate::new(200).set_body_string(yaml))
        .expect(1)
        .mount(repo.server())
        .await;
    Mock::given(method("GET"))
        .and(path("/private.svg"))
        .and(header("authorization", auth))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(SVG_ICON.as_bytes().to_vec(), "image/svg+xml"),
        )
        .expect(1)
        .mount(repo.server())
        .await;
    Mock::given(method("GET"))
        .and(path("/private-1.0.0.tgz"))
        .and(header("authorization", auth))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(chart_tarball("private"), "application/x-tar"),
        )
        .expect(1)
        .mount(repo.server())
        .await;

    let store = memory_store();
    let syncer = memory_syncer(&store);
    let outcome = syncer
        .sync_repo("private", &repo.url(), Some(auth))
        .await
        .unwrap();
    let SyncOutcome::Synced { report, .. } = outcome else {
        panic!("expected a full sync");
    };
    assert!(report.is_clean(), "failures: {:?}", report.failures);

    let chart = syncer
        .catalog()
        .find_chart("private/private")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chart.raw_icon.as_deref(), Some(SVG_ICON.as_bytes()));
    assert!(chart.repo.authorization_header.is_none());
}

/// Test repository deletion after a sync
#[tokio::test]
async fn test_delete_repo_after_sync() {
    let repo = MockChartRepo::start().await;
    serve_stable(&repo).await;
    let store = memory_store();
    let syncer = memory_syncer(&store);
    syncer.sync_repo("stable", &repo.url(), None).await.unwrap();

    let summary = syncer.delete_repo("stable").await.unwrap();
    assert_eq!(summary.charts, 2);
    assert_eq!(summary.chart_files, 3);
    assert_eq!(summary.checks, 1);

    let outcome = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();
    assert!(!outcome.is_skipped());
}

/// Test two repositories side by side
#[tokio::test]
async fn test_repositories_are_independent() {
    let stable = MockChartRepo::start().await;
    serve_stable(&stable).await;
    let incubator = MockChartRepo::start().await;
    incubator
        .serve_index(&index_yaml(vec![chart_entry(
            "redis",
            "2.0.0",
            "2024-01-01T00:00:00Z",
            "redis-2.0.0.tgz",
        )]))
        .await;
    incubator
        .serve_tarball("/redis-2.0.0.tgz", chart_tarball("redis"))
        .await;

    let store = memory_store();
    let syncer = memory_syncer(&store);
    syncer.sync_repo("stable", &stable.url(), None).await.unwrap();
    syncer
        .sync_repo("incubator", &incubator.url(), None)
        .await
        .unwrap();

    syncer.delete_repo("incubator").await.unwrap();
    assert_eq!(syncer.catalog().list_charts("stable").await.unwrap().len(), 2);
    assert!(
        syncer
            .catalog()
            .find_repo_check("stable")
            .await
            .unwrap()
            .is_some()
    );
}

/// Test a sync persisted in SQLite and resumed by a second syncer
#[tokio::test]
async fn test_sqlite_sync_survives_restart() {
    let repo = MockChartRepo::start().await;
    serve_stable(&repo).await;
    let temp = setup_test_env();
    let config = create_test_config(&temp);

    {
        let syncer = ChartRepoSyncer::from_config(&config).await.unwrap();
        let outcome = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();
        assert!(!outcome.is_skipped());
    }

    let syncer = ChartRepoSyncer::from_config(&config).await.unwrap();
    let outcome = syncer.sync_repo("stable", &repo.url(), None).await.unwrap();
    assert!(outcome.is_skipped());

    let charts = syncer.catalog().list_charts("stable").await.unwrap();
    assert_eq!(charts.len(), 2);
    assert!(charts[1].raw_icon.is_some());
}

/// Test the memory backend selected through configuration
#[tokio::test]
async fn test_memory_backend_from_config() {
    let repo = MockChartRepo::start().await;
    serve_stable(&repo).await;
    let temp = setup_test_env();
    let mut config = create_test_config(&temp);
    config.storage.backend = StorageBackend::Memory;

    let syncer = ChartRepoSyncer::from_config(&config).await.unwrap();
    syncer.sync_repo("stable", &repo.url(), None).await.unwrap();

    assert_eq!(syncer.catalog().list_charts("stable").await.unwrap().len(), 2);
    assert!(!temp.path().join("charts.db").exists());
}

