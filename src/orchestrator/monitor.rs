//! The Monitor (§4.4): periodically rescans the source folders of jobs in
//! COMPLETED, IN_PROGRESS, or FAILED state and re-enqueues files whose size
//! or mtime changed since upload (or that are brand new), flipping the job
//! back to IN_PROGRESS. Rescanning FAILED jobs lets a later successful
//! re-upload carry the job to COMPLETED (§7). Disabled entirely when
//! `monitor_interval_secs` is `0`. Grounded on the agent's simple
//! interval-loop ping service rather than the server's cron scheduler — this
//! system has one recurring task, not a table of them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::db::connection::DbPool;
use crate::objectstore::ObjectStore;
use crate::store::file::{self, FileState};
use crate::store::job::{self, JobState};

use super::{run_job, walk, RunningJobs};

pub async fn run(
    pool: DbPool,
    store: Arc<dyn ObjectStore>,
    config: Arc<EngineConfig>,
    cancel: CancellationToken,
    running: RunningJobs,
) {
    if config.monitor_interval_secs == 0 {
        info!("monitor: disabled (monitor_interval_secs = 0)");
        return;
    }
    let mut tick = tokio::time::interval(Duration::from_secs(config.monitor_interval_secs));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("monitor: shutting down");
                return;
            }
            _ = tick.tick() => {
                if let Err(e) = sweep(&pool, &store, &config, &cancel, &running).await {
                    warn!("monitor sweep failed: {e}");
                }
            }
        }
    }
}

/// Runs one sweep synchronously, for tests that can't wait out a full
/// `monitor_interval_secs` tick.
#[cfg(any(test, feature = "test-util"))]
pub async fn run_sweep_for_test(
    pool: &DbPool,
    store: &Arc<dyn ObjectStore>,
    config: &Arc<EngineConfig>,
    cancel: &CancellationToken,
    running: &RunningJobs,
) -> anyhow::Result<()> {
    sweep(pool, store, config, cancel, running).await
}

async fn sweep(
    pool: &DbPool,
    store: &Arc<dyn ObjectStore>,
    config: &Arc<EngineConfig>,
    cancel: &CancellationToken,
    running: &RunningJobs,
) -> anyhow::Result<()> {
    let jobs = {
        let conn = pool.get()?;
        job::find_all(&conn)?
    };

    for current_job in jobs.into_iter().filter(|j| {
        matches!(j.state, JobState::Completed | JobState::InProgress | JobState::Failed)
    }) {
        if running.contains_key(&current_job.id) {
            continue;
        }

        let scanned = match walk::scan(
            std::path::Path::new(&current_job.source_folder),
            current_job.pattern.as_deref(),
        ) {
            Ok(s) => s,
            Err(e) => {
                warn!(job_id = %current_job.id, "monitor: rescan failed: {e}");
                continue;
            }
        };

        let mut conn = pool.get()?;
        let known: HashMap<String, file::File> = file::list_by_job(&conn, &current_job.id)?
            .into_iter()
            .map(|f| (f.path.clone(), f))
            .collect();

        let stability_cutoff = chrono::Utc::now().timestamp() - config.stability_threshold_secs;
        let mut changed = false;
        for stat in &scanned {
            match known.get(&stat.path) {
                Some(existing)
                    if matches!(existing.state, FileState::Uploaded | FileState::Failed)
                        && (existing.mtime != stat.mtime || existing.size != stat.size)
                        && stat.mtime <= stability_cutoff =>
                {
                    file::update_stat(&conn, existing.id, stat.mtime, stat.size, FileState::Pending)?;
                    changed = true;
                }
                None if stat.mtime <= stability_cutoff => {
                    changed = true;
                }
                _ => {}
            }
        }
        // New files picked up by the rescan. Same stability gate as the
        // changed-file arm above: a file mid-write hasn't settled yet.
        let new_stats: Vec<_> = scanned
            .iter()
            .filter(|s| !known.contains_key(&s.path) && s.mtime <= stability_cutoff)
            .cloned()
            .collect();
        if !new_stats.is_empty() {
            file::create_bulk(&mut conn, &current_job.id, &new_stats)?;
        }

        if !changed {
            continue;
        }

        job::set_state(&conn, &current_job.id, JobState::InProgress)?;
        info!(job_id = %current_job.id, "monitor: detected drift, resubmitting job");

        running.insert(current_job.id.clone(), ());
        let pool = pool.clone();
        let store = Arc::clone(store);
        let config = Arc::clone(config);
        let cancel = cancel.clone();
        let running = Arc::clone(running);
        let id = current_job.id.clone();
        tokio::spawn(async move {
            if let Err(e) = run_job(pool, store, config, current_job, cancel).await {
                warn!(job_id = %id, "monitor-triggered run failed: {e}");
            }
            running.remove(&id);
        });
    }
    Ok(())
}
