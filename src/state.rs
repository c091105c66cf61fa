use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::db::connection::DbPool;
use crate::error::{EngineError, Result};
use crate::objectstore::ObjectStore;
use crate::orchestrator::{self, RunningJobs};
use crate::store::file::File;
use crate::store::job::{self, JobSummary, NewJob, UploadJob};

/// Holds everything a job run needs and the bookkeeping that keeps the
/// Monitor from re-submitting a job the Worker Pool is already draining.
pub struct Engine {
    pub db: DbPool,
    pub store: Arc<dyn ObjectStore>,
    pub config: Arc<EngineConfig>,
    pub cancel: CancellationToken,
    pub running_jobs: RunningJobs,
}

impl Engine {
    pub fn new(db: DbPool, store: Arc<dyn ObjectStore>, config: EngineConfig) -> Self {
        Self {
            db,
            store,
            config: Arc::new(config),
            cancel: CancellationToken::new(),
            running_jobs: Arc::new(dashmap::DashMap::new()),
        }
    }

    /// Registers a new job and immediately starts its Worker Pool run in the
    /// background. Returns the job record right away; callers poll
    /// `job_summary` for progress.
    pub fn submit_job(
        &self,
        source_folder: String,
        destination_bucket: String,
        pattern: Option<String>,
    ) -> Result<UploadJob> {
        let conn = self.db.get().map_err(|e| EngineError::Store(e.into()))?;
        let new_job = NewJob {
            id: Uuid::new_v4().to_string(),
            source_folder,
            destination_bucket,
            pattern,
        };
        let created = job::create(&conn, &new_job).map_err(|e| {
            if e.to_string().contains("already exists") {
                EngineError::JobExists(new_job.id.clone())
            } else {
                EngineError::Store(e)
            }
        })?;
        drop(conn);

        self.running_jobs.insert(created.id.clone(), ());
        let db = self.db.clone();
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let cancel = self.cancel.clone();
        let running = Arc::clone(&self.running_jobs);
        let job = created.clone();
        tokio::spawn(async move {
            let id = job.id.clone();
            if let Err(e) = orchestrator::run_job(db, store, config, job, cancel).await {
                tracing::warn!(job_id = %id, "job run failed: {e}");
            }
            running.remove(&id);
        });

        Ok(created)
    }

    pub fn get_job(&self, id: &str) -> Result<UploadJob> {
        let conn = self.db.get().map_err(|e| EngineError::Store(e.into()))?;
        job::find_by_id(&conn, id)
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::JobNotFound(id.to_string()))
    }

    pub fn list_jobs(&self) -> Result<Vec<UploadJob>> {
        let conn = self.db.get().map_err(|e| EngineError::Store(e.into()))?;
        job::find_all(&conn).map_err(EngineError::Store)
    }

    pub fn list_files(&self, job_id: &str) -> Result<Vec<File>> {
        let conn = self.db.get().map_err(|e| EngineError::Store(e.into()))?;
        crate::store::file::list_by_job(&conn, job_id).map_err(EngineError::Store)
    }

    pub fn job_summary(&self, job_id: &str) -> Result<JobSummary> {
        let conn = self.db.get().map_err(|e| EngineError::Store(e.into()))?;
        job::summarize_job(&conn, job_id).map_err(EngineError::Store)
    }

    /// Spawns the Monitor loop; returns immediately. A no-op when
    /// `monitor_interval_secs` is `0` (Monitor disabled).
    pub fn start_monitor(&self) {
        if self.config.monitor_interval_secs == 0 {
            tracing::info!("monitor: disabled (monitor_interval_secs = 0)");
            return;
        }
        let db = self.db.clone();
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let cancel = self.cancel.clone();
        let running = Arc::clone(&self.running_jobs);
        tokio::spawn(orchestrator::monitor::run(db, store, config, cancel, running));
    }

    /// Resumes any job left mid-flight by a previous process.
    pub async fn recover(&self) {
        orchestrator::recover_incomplete_jobs(
            self.db.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.config),
            self.cancel.clone(),
            Arc::clone(&self.running_jobs),
        )
        .await;
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
