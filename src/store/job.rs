use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::InProgress => "in_progress",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> rusqlite::Result<Self> {
        match s {
            "pending" => Ok(JobState::Pending),
            "in_progress" => Ok(JobState::InProgress),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(rusqlite::Error::InvalidColumnType(
                0,
                format!("unknown job state: {other}"),
                rusqlite::types::Type::Text,
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: String,
    pub source_folder: String,
    pub destination_bucket: String,
    pub pattern: Option<String>,
    pub state: JobState,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub source_folder: String,
    pub destination_bucket: String,
    pub pattern: Option<String>,
}

fn row_to_job(row: &Row) -> rusqlite::Result<UploadJob> {
    let state: String = row.get("state")?;
    Ok(UploadJob {
        id: row.get("id")?,
        source_folder: row.get("source_folder")?,
        destination_bucket: row.get("destination_bucket")?,
        pattern: row.get("pattern")?,
        state: JobState::parse(&state)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<UploadJob>> {
    let mut stmt = conn.prepare("SELECT * FROM upload_jobs ORDER BY created_at DESC")?;
    let rows = stmt.query_map([], row_to_job)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn find_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<UploadJob>> {
    let mut stmt = conn.prepare("SELECT * FROM upload_jobs WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], row_to_job)?;
    Ok(rows.next().and_then(|r| r.ok()))
}

/// Inserts if `job.id` is unused, else fails with a job-exists error the
/// caller maps to `EngineError::JobExists`.
pub fn create(conn: &Connection, job: &NewJob) -> anyhow::Result<UploadJob> {
    if find_by_id(conn, &job.id)?.is_some() {
        anyhow::bail!("job already exists: {}", job.id);
    }
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO upload_jobs (id, source_folder, destination_bucket, pattern, state, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
        params![job.id, job.source_folder, job.destination_bucket, job.pattern, now],
    )?;
    find_by_id(conn, &job.id)?.ok_or_else(|| anyhow::anyhow!("failed to retrieve created job"))
}

/// Idempotent: setting the same state twice is a no-op beyond `updated_at`.
pub fn set_state(conn: &Connection, id: &str, state: JobState) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE upload_jobs SET state = ?, updated_at = datetime('now') WHERE id = ?",
        params![state.as_str(), id],
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobSummary {
    pub pending: i64,
    pub in_progress: i64,
    pub uploaded: i64,
    pub failed: i64,
}

impl JobSummary {
    pub fn total(&self) -> i64 {
        self.pending + self.in_progress + self.uploaded + self.failed
    }
}

/// Returns counts per file-state; used for progress and for deciding the
/// job's terminal state.
pub fn summarize_job(conn: &Connection, job_id: &str) -> anyhow::Result<JobSummary> {
    let mut stmt = conn.prepare(
        "SELECT state, COUNT(*) FROM files WHERE upload_job_id = ? GROUP BY state",
    )?;
    let mut summary = JobSummary::default();
    let rows = stmt.query_map(params![job_id], |row| {
        let state: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((state, count))
    })?;
    for row in rows.filter_map(|r| r.ok()) {
        match row.0.as_str() {
            "pending" => summary.pending = row.1,
            "in_progress" => summary.in_progress = row.1,
            "uploaded" => summary.uploaded = row.1,
            "failed" => summary.failed = row.1,
            _ => {}
        }
    }
    Ok(summary)
}
