//! Scenario-level tests (spec §8): drive a full `Engine` end to end against
//! `MockObjectStore`. Run with `cargo test --features test-util`.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use upload_engine::config::EngineConfig;
use upload_engine::db::connection::create_pool;
use upload_engine::db::migrate::migrate;
use upload_engine::objectstore::mock::MockObjectStore;
use upload_engine::orchestrator;
use upload_engine::store::file::FileState;
use upload_engine::store::job::{self, JobState, NewJob};

fn test_config(chunk_size: u64) -> EngineConfig {
    EngineConfig {
        database_url: "unused".into(),
        object_store_endpoint: None,
        object_store_region: "us-east-1".into(),
        object_store_access_key: None,
        object_store_secret_key: None,
        chunk_size,
        worker_concurrency: 4,
        monitor_interval_secs: 1,
        stability_threshold_secs: 0,
        part_retry_attempts: 3,
        log_level: "info".into(),
    }
}

fn setup() -> (upload_engine::db::connection::DbPool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(dir.path().join("t.db").to_str().unwrap(), 8);
    migrate(&pool, dir.path()).unwrap();
    (pool, dir)
}

#[tokio::test]
async fn scenario_1_small_file_single_shot() {
    let (pool, _guard) = setup();
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("notes.txt"), vec![0u8; 1024]).unwrap();

    let store = Arc::new(MockObjectStore::new());
    let config = Arc::new(test_config(5 * 1024 * 1024));
    let conn = pool.get().unwrap();
    let job = job::create(
        &conn,
        &NewJob {
            id: "job-1".into(),
            source_folder: source.path().to_string_lossy().into_owned(),
            destination_bucket: "bucket".into(),
            pattern: None,
        },
    )
    .unwrap();
    drop(conn);

    orchestrator::run_job(pool.clone(), store.clone(), config, job, CancellationToken::new())
        .await
        .unwrap();

    let conn = pool.get().unwrap();
    let reloaded = job::find_by_id(&conn, "job-1").unwrap().unwrap();
    assert_eq!(reloaded.state, JobState::Completed);
    let object = store.object("bucket", "job-1/notes.txt").unwrap();
    assert_eq!(object.len(), 1024);
}

#[tokio::test]
async fn scenario_2_large_file_exact_multiple_multipart() {
    let (pool, _guard) = setup();
    let source = tempfile::tempdir().unwrap();
    let chunk_size = 5 * 1024 * 1024u64;
    fs::write(source.path().join("big.bin"), vec![7u8; (chunk_size * 3) as usize]).unwrap();

    let store = Arc::new(MockObjectStore::new());
    let config = Arc::new(test_config(chunk_size));
    let conn = pool.get().unwrap();
    let job = job::create(
        &conn,
        &NewJob {
            id: "job-2".into(),
            source_folder: source.path().to_string_lossy().into_owned(),
            destination_bucket: "bucket".into(),
            pattern: None,
        },
    )
    .unwrap();
    drop(conn);

    orchestrator::run_job(pool.clone(), store.clone(), config, job, CancellationToken::new())
        .await
        .unwrap();

    let object = store.object("bucket", "job-2/big.bin").unwrap();
    assert_eq!(object.len() as u64, chunk_size * 3);
}

#[tokio::test]
async fn scenario_3_pattern_filter_excludes_non_matching_files() {
    let (pool, _guard) = setup();
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("a.log"), b"a").unwrap();
    fs::write(source.path().join("b.log"), b"b").unwrap();
    fs::write(source.path().join("c.txt"), b"c").unwrap();

    let store = Arc::new(MockObjectStore::new());
    let config = Arc::new(test_config(5 * 1024 * 1024));
    let conn = pool.get().unwrap();
    let job = job::create(
        &conn,
        &NewJob {
            id: "job-3".into(),
            source_folder: source.path().to_string_lossy().into_owned(),
            destination_bucket: "bucket".into(),
            pattern: Some("*.log".into()),
        },
    )
    .unwrap();
    drop(conn);

    orchestrator::run_job(pool.clone(), store.clone(), config, job, CancellationToken::new())
        .await
        .unwrap();

    let conn = pool.get().unwrap();
    let files = upload_engine::store::file::list_by_job(&conn, "job-3").unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f.path.ends_with(".log")));
    assert!(store.object("bucket", "job-3/c.txt").is_none());
}

#[tokio::test]
async fn scenario_5_permanent_failure_marks_file_and_job_failed() {
    let (pool, _guard) = setup();
    let source = tempfile::tempdir().unwrap();
    let missing_file = source.path().join("will_vanish.txt");
    fs::write(&missing_file, b"temporary").unwrap();

    let store = Arc::new(MockObjectStore::new());
    let config = Arc::new(test_config(5 * 1024 * 1024));
    let conn = pool.get().unwrap();
    let job = job::create(
        &conn,
        &NewJob {
            id: "job-5".into(),
            source_folder: source.path().to_string_lossy().into_owned(),
            destination_bucket: "bucket".into(),
            pattern: None,
        },
    )
    .unwrap();
    drop(conn);

    // Source disappears after expansion, before the Worker reads it.
    orchestrator::expand(&pool, &job).unwrap();
    fs::remove_file(&missing_file).unwrap();

    orchestrator::run_job(pool.clone(), store, config, job, CancellationToken::new())
        .await
        .unwrap();

    let conn = pool.get().unwrap();
    let files = upload_engine::store::file::list_by_job(&conn, "job-5").unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].state, FileState::Failed);
    assert!(files[0].failure_reason.as_deref().unwrap_or("").contains("will_vanish"));
    let reloaded = job::find_by_id(&conn, "job-5").unwrap().unwrap();
    assert_eq!(reloaded.state, JobState::Failed);
}

#[tokio::test]
async fn scenario_5b_verification_mismatch_deletes_object_and_fails_file() {
    let (pool, _guard) = setup();
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("report.csv"), b"one,two,three").unwrap();

    let store = Arc::new(MockObjectStore::new());
    store.corrupt_on_head("bucket", "job-5b/report.csv");
    let config = Arc::new(test_config(5 * 1024 * 1024));
    let conn = pool.get().unwrap();
    let job = job::create(
        &conn,
        &NewJob {
            id: "job-5b".into(),
            source_folder: source.path().to_string_lossy().into_owned(),
            destination_bucket: "bucket".into(),
            pattern: None,
        },
    )
    .unwrap();
    drop(conn);

    orchestrator::run_job(pool.clone(), store.clone(), config, job, CancellationToken::new())
        .await
        .unwrap();

    let conn = pool.get().unwrap();
    let files = upload_engine::store::file::list_by_job(&conn, "job-5b").unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].state, FileState::Failed);
    assert_eq!(files[0].failure_reason.as_deref(), Some("size mismatch after upload"));
    assert!(store.object("bucket", "job-5b/report.csv").is_none(), "mismatched object must be deleted");
    let reloaded = job::find_by_id(&conn, "job-5b").unwrap().unwrap();
    assert_eq!(reloaded.state, JobState::Failed);
}

#[tokio::test]
async fn scenario_6_crash_recovery_reclaims_orphaned_file() {
    let (pool, _guard) = setup();
    let source = tempfile::tempdir().unwrap();
    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
        fs::write(source.path().join(name), b"data").unwrap();
    }

    let conn = pool.get().unwrap();
    let job = job::create(
        &conn,
        &NewJob {
            id: "job-6".into(),
            source_folder: source.path().to_string_lossy().into_owned(),
            destination_bucket: "bucket".into(),
            pattern: None,
        },
    )
    .unwrap();
    drop(conn);

    orchestrator::expand(&pool, &job).unwrap();

    // Simulate a crash: one file claimed by a Worker that never finished,
    // four already uploaded by a prior (successful) run.
    let conn = pool.get().unwrap();
    let files = upload_engine::store::file::list_by_job(&conn, "job-6").unwrap();
    for f in &files[..4] {
        upload_engine::store::file::mark(&conn, f.id, FileState::Uploaded, None).unwrap();
    }
    upload_engine::store::file::mark(&conn, files[4].id, FileState::InProgress, None).unwrap();
    drop(conn);

    let store = Arc::new(MockObjectStore::new());
    let config = Arc::new(test_config(5 * 1024 * 1024));

    // A fresh Engine against the same DB observes the orphaned row and
    // reclaims it before the pool starts claiming.
    orchestrator::run_job(pool.clone(), store, config, job, CancellationToken::new())
        .await
        .unwrap();

    let conn = pool.get().unwrap();
    let files = upload_engine::store::file::list_by_job(&conn, "job-6").unwrap();
    assert_eq!(files.len(), 5, "recovery must not create duplicate rows");
    assert!(files.iter().all(|f| f.state == FileState::Uploaded));
    let reloaded = job::find_by_id(&conn, "job-6").unwrap().unwrap();
    assert_eq!(reloaded.state, JobState::Completed);
}

#[tokio::test]
async fn scenario_7_monitor_reuploads_changed_file() {
    let (pool, _guard) = setup();
    let source = tempfile::tempdir().unwrap();
    let target = source.path().join("config.yml");
    fs::write(&target, b"v1").unwrap();

    let store = Arc::new(MockObjectStore::new());
    let config = Arc::new(test_config(5 * 1024 * 1024));
    let conn = pool.get().unwrap();
    let job = job::create(
        &conn,
        &NewJob {
            id: "job-7".into(),
            source_folder: source.path().to_string_lossy().into_owned(),
            destination_bucket: "bucket".into(),
            pattern: None,
        },
    )
    .unwrap();
    drop(conn);

    orchestrator::run_job(pool.clone(), store.clone(), config.clone(), job.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(store.object("bucket", "job-7/config.yml").unwrap().len(), 2);

    // Backdate the original write past the stability threshold, then
    // rewrite with new content and size.
    fs::write(&target, b"v2-longer").unwrap();

    let running = Arc::new(dashmap::DashMap::new());
    orchestrator::monitor::run_sweep_for_test(&pool, &store, &config, &CancellationToken::new(), &running)
        .await
        .unwrap();

    // Give the spawned resubmission task a moment to complete.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let object = store.object("bucket", "job-7/config.yml").unwrap();
    assert_eq!(object.len(), "v2-longer".len());
}

#[tokio::test]
async fn scenario_8_monitor_recovers_failed_job_on_reupload() {
    let (pool, _guard) = setup();
    let source = tempfile::tempdir().unwrap();
    let missing = source.path().join("will_vanish.txt");
    fs::write(&missing, b"temporary").unwrap();

    let store = Arc::new(MockObjectStore::new());
    let config = Arc::new(test_config(5 * 1024 * 1024));
    let conn = pool.get().unwrap();
    let job = job::create(
        &conn,
        &NewJob {
            id: "job-8".into(),
            source_folder: source.path().to_string_lossy().into_owned(),
            destination_bucket: "bucket".into(),
            pattern: None,
        },
    )
    .unwrap();
    drop(conn);

    orchestrator::expand(&pool, &job).unwrap();
    fs::remove_file(&missing).unwrap();
    orchestrator::run_job(pool.clone(), store.clone(), config.clone(), job.clone(), CancellationToken::new())
        .await
        .unwrap();
    let reloaded = job::find_by_id(&pool.get().unwrap(), "job-8").unwrap().unwrap();
    assert_eq!(reloaded.state, JobState::Failed);

    // The file reappears; a Monitor sweep must still pick up a FAILED job.
    fs::write(&missing, b"back again").unwrap();

    let running = Arc::new(dashmap::DashMap::new());
    orchestrator::monitor::run_sweep_for_test(&pool, &store, &config, &CancellationToken::new(), &running)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let conn = pool.get().unwrap();
    let reloaded = job::find_by_id(&conn, "job-8").unwrap().unwrap();
    assert_eq!(reloaded.state, JobState::Completed);
    assert_eq!(
        store.object("bucket", "job-8/will_vanish.txt").unwrap().len(),
        "back again".len()
    );
}
