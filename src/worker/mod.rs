//! The Worker Pool (§4.3): a bounded number of concurrent tasks that each
//! claim one File at a time, upload it, and report the outcome back to the
//! Orchestrator. Modeled on the agent's adaptive-concurrency executor, but
//! simplified to a flat semaphore — part-size retry/backoff is handled by
//! the multipart module instead of varying permit weight.

pub mod multipart;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::db::connection::DbPool;
use crate::error::{EngineError, Result};
use crate::objectstore::ObjectStore;
use crate::store::file::{self, FileState};
use crate::store::job::UploadJob;

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerOutcome {
    pub uploaded: u64,
    pub failed: u64,
}

/// Runs up to `config.worker_concurrency` workers against `job` until there
/// is no pending work left. Each worker loops: claim, upload, mark, repeat.
pub async fn run_pool(
    pool: DbPool,
    store: Arc<dyn ObjectStore>,
    job: UploadJob,
    config: Arc<EngineConfig>,
    cancel: CancellationToken,
) -> WorkerOutcome {
    let permits = Arc::new(Semaphore::new(config.worker_concurrency));
    let mut handles = Vec::with_capacity(config.worker_concurrency);

    for worker_id in 0..config.worker_concurrency {
        let pool = pool.clone();
        let store = Arc::clone(&store);
        let job = job.clone();
        let config = Arc::clone(&config);
        let cancel = cancel.clone();
        let permits = Arc::clone(&permits);

        handles.push(tokio::spawn(async move {
            let mut outcome = WorkerOutcome::default();
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let _permit = match permits.acquire().await {
                    Ok(p) => p,
                    Err(_) => break,
                };

                let claimed = {
                    let conn = match pool.get() {
                        Ok(c) => c,
                        Err(e) => {
                            warn!(worker_id, "failed to get db connection: {e}");
                            break;
                        }
                    };
                    file::claim_next_pending(&conn, &job.id)
                };
                let claimed = match claimed {
                    Ok(Some(f)) => f,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(worker_id, "claim failed: {e}");
                        break;
                    }
                };

                info!(worker_id, file = %claimed.path, "uploading file");
                let result = upload_one(&pool, &store, &job, &claimed, &config, &cancel).await;

                let conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(worker_id, "failed to get db connection for result: {e}");
                        continue;
                    }
                };
                match result {
                    Ok(()) => {
                        outcome.uploaded += 1;
                        let _ = file::mark(&conn, claimed.id, FileState::Uploaded, None);
                    }
                    Err(e) => {
                        outcome.failed += 1;
                        warn!(worker_id, file = %claimed.path, "upload failed: {e}");
                        let _ = file::mark(&conn, claimed.id, FileState::Failed, Some(&e.to_string()));
                    }
                }
            }
            outcome
        }));
    }

    let mut total = WorkerOutcome::default();
    for handle in handles {
        if let Ok(outcome) = handle.await {
            total.uploaded += outcome.uploaded;
            total.failed += outcome.failed;
        }
    }
    total
}

/// Destination key mirrors the file's path relative to the job's source
/// folder, so the bucket layout matches the directory layout.
fn destination_key(job: &UploadJob, relative_path: &str) -> String {
    format!("{}/{}", job.id, relative_path)
}

fn classify_store_error(e: crate::objectstore::StoreError) -> EngineError {
    match e {
        crate::objectstore::StoreError::Transient(m) => EngineError::Transient(m),
        crate::objectstore::StoreError::Permanent(m) => EngineError::Permanent(m),
        crate::objectstore::StoreError::NotFound(m) => EngineError::Permanent(format!("not found: {m}")),
    }
}

/// Uploads one claimed file and verifies it landed intact (§4.3 steps 2-4).
async fn upload_one(
    pool: &DbPool,
    store: &Arc<dyn ObjectStore>,
    job: &UploadJob,
    claimed: &file::File,
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let relative_path = &claimed.path;
    let full_path = Path::new(&job.source_folder).join(relative_path);
    let metadata = tokio::fs::metadata(&full_path)
        .await
        .map_err(|e| EngineError::Source(format!("{}: {e}", full_path.display())))?;
    let size = metadata.len();
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let key = destination_key(job, relative_path);

    // The just-observed stat becomes the canonical record before the upload
    // begins, so a Monitor rescan racing this upload compares against what
    // is actually being sent, not a stale row.
    {
        let conn = pool.get().map_err(|e| EngineError::Store(e.into()))?;
        file::update_stat(&conn, claimed.id, mtime, size as i64, FileState::InProgress)
            .map_err(EngineError::Store)?;
    }

    if size >= config.chunk_size {
        multipart::upload_multipart(
            store.as_ref(),
            &job.destination_bucket,
            &key,
            &full_path,
            config.chunk_size,
            config.part_retry_attempts,
            cancel,
        )
        .await?;
    } else {
        let body = tokio::fs::read(&full_path)
            .await
            .map_err(|e| EngineError::Source(format!("{}: {e}", full_path.display())))?;
        store
            .put_object(&job.destination_bucket, &key, bytes::Bytes::from(body))
            .await
            .map_err(classify_store_error)?;
    }

    verify_upload(store, &job.destination_bucket, &key, size).await
}

/// Post-upload Verify step (§4.3 step 4, §8 verification law): a `head_object`
/// whose reported size disagrees with what was just uploaded means the
/// object is deleted and the file fails permanently rather than being left
/// looking UPLOADED with the wrong bytes behind it.
async fn verify_upload(
    store: &Arc<dyn ObjectStore>,
    bucket: &str,
    key: &str,
    expected_size: u64,
) -> Result<()> {
    let observed = store.head_object(bucket, key).await.map_err(classify_store_error)?;
    if observed == Some(expected_size) {
        return Ok(());
    }
    warn!(bucket, key, expected_size, ?observed, "post-upload verification failed");
    let _ = store.delete_object(bucket, key).await;
    Err(EngineError::Verification("size mismatch after upload".into()))
}
