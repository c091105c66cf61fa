//! The Orchestrator (§4.4): expands a job into File rows, drives the Worker
//! Pool against it, and rolls the per-file outcomes up into the job's
//! terminal state. Recovery at startup re-submits any job left mid-flight
//! by a previous process.

pub mod monitor;
mod walk;

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::db::connection::DbPool;
use crate::error::{EngineError, Result};
use crate::objectstore::ObjectStore;
use crate::store::job::{self, JobSummary, JobState, UploadJob};
use crate::worker;

/// Tracks job IDs with an active worker pool, so the Monitor never
/// double-submits a job that's already running.
pub type RunningJobs = Arc<DashMap<String, ()>>;

/// Walks the job's source folder and records every matching file as PENDING.
/// Safe to call more than once for the same job (`create_bulk` is an upsert
/// that skips rows already known).
pub fn expand(pool: &DbPool, job: &UploadJob) -> Result<usize> {
    let stats = walk::scan(std::path::Path::new(&job.source_folder), job.pattern.as_deref())?;
    let mut conn = pool.get().map_err(|e| EngineError::Store(e.into()))?;
    let inserted = crate::store::file::create_bulk(&mut conn, &job.id, &stats)
        .map_err(EngineError::Store)?;
    info!(job_id = %job.id, inserted, scanned = stats.len(), "expanded job");
    Ok(inserted)
}

/// Expands the job (if needed), runs the Worker Pool to drain all PENDING
/// files, and sets the job's terminal state from the resulting summary.
pub async fn run_job(
    pool: DbPool,
    store: Arc<dyn ObjectStore>,
    config: Arc<EngineConfig>,
    job: UploadJob,
    cancel: CancellationToken,
) -> Result<JobSummary> {
    expand(&pool, &job)?;

    {
        let conn = pool.get().map_err(|e| EngineError::Store(e.into()))?;
        // A crash/restart between claim and upload leaves orphaned
        // IN_PROGRESS rows no live Worker owns; reclaim them before the
        // pool starts so recovery converges instead of starving.
        let reset = crate::store::file::reset_orphaned_in_progress(&conn, &job.id)
            .map_err(EngineError::Store)?;
        if reset > 0 {
            info!(job_id = %job.id, reset, "reclaimed orphaned in-progress files");
        }
        job::set_state(&conn, &job.id, JobState::InProgress).map_err(EngineError::Store)?;
    }

    let outcome = worker::run_pool(pool.clone(), store, job.clone(), config, cancel).await;

    let conn = pool.get().map_err(|e| EngineError::Store(e.into()))?;
    let summary = job::summarize_job(&conn, &job.id).map_err(EngineError::Store)?;

    let terminal = if summary.failed > 0 {
        JobState::Failed
    } else if summary.pending > 0 || summary.in_progress > 0 {
        // Cancelled mid-flight: leave it re-claimable rather than Failed.
        JobState::InProgress
    } else {
        JobState::Completed
    };
    job::set_state(&conn, &job.id, terminal).map_err(EngineError::Store)?;

    info!(job_id = %job.id, uploaded = outcome.uploaded, failed = outcome.failed, state = terminal.as_str(), "job run finished");
    Ok(summary)
}

/// Startup recovery pass (§4.4): any job not in a terminal COMPLETED state
/// is resumed — its PENDING/IN_PROGRESS files are exactly what the Worker
/// Pool will claim, so resuming is just running the job again.
pub async fn recover_incomplete_jobs(
    pool: DbPool,
    store: Arc<dyn ObjectStore>,
    config: Arc<EngineConfig>,
    cancel: CancellationToken,
    running: RunningJobs,
) {
    let jobs = {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(e) => {
                warn!("recovery: failed to get db connection: {e}");
                return;
            }
        };
        match job::find_all(&conn) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("recovery: failed to list jobs: {e}");
                return;
            }
        }
    };

    for job in jobs {
        if matches!(job.state, JobState::Completed) {
            continue;
        }
        if running.contains_key(&job.id) {
            continue;
        }
        running.insert(job.id.clone(), ());
        info!(job_id = %job.id, state = job.state.as_str(), "resuming job after restart");

        let pool = pool.clone();
        let store = Arc::clone(&store);
        let config = Arc::clone(&config);
        let cancel = cancel.clone();
        let running = Arc::clone(&running);
        tokio::spawn(async move {
            let id = job.id.clone();
            if let Err(e) = run_job(pool, store, config, job, cancel).await {
                warn!(job_id = %id, "recovered job failed: {e}");
            }
            running.remove(&id);
        });
    }
}
