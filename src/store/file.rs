use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Pending,
    InProgress,
    Uploaded,
    Failed,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Pending => "pending",
            FileState::InProgress => "in_progress",
            FileState::Uploaded => "uploaded",
            FileState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> rusqlite::Result<Self> {
        match s {
            "pending" => Ok(FileState::Pending),
            "in_progress" => Ok(FileState::InProgress),
            "uploaded" => Ok(FileState::Uploaded),
            "failed" => Ok(FileState::Failed),
            other => Err(rusqlite::Error::InvalidColumnType(
                0,
                format!("unknown file state: {other}"),
                rusqlite::types::Type::Text,
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub upload_job_id: String,
    pub path: String,
    pub state: FileState,
    pub failure_reason: Option<String>,
    pub mtime: i64,
    pub size: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// One row emitted by a directory walk: relative path + last-observed stat.
#[derive(Debug, Clone)]
pub struct NewFileStat {
    pub path: String,
    pub mtime: i64,
    pub size: i64,
}

fn row_to_file(row: &Row) -> rusqlite::Result<File> {
    let state: String = row.get("state")?;
    Ok(File {
        id: row.get("id")?,
        upload_job_id: row.get("upload_job_id")?,
        path: row.get("path")?,
        state: FileState::parse(&state)?,
        failure_reason: row.get("failure_reason")?,
        mtime: row.get("mtime")?,
        size: row.get("size")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<File>> {
    let mut stmt = conn.prepare("SELECT * FROM files WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], row_to_file)?;
    Ok(rows.next().and_then(|r| r.ok()))
}

pub fn list_by_job(conn: &Connection, job_id: &str) -> anyhow::Result<Vec<File>> {
    let mut stmt = conn.prepare("SELECT * FROM files WHERE upload_job_id = ? ORDER BY path ASC")?;
    let rows = stmt.query_map(params![job_id], row_to_file)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_by_job_and_state(
    conn: &Connection,
    job_id: &str,
    state: FileState,
) -> anyhow::Result<Vec<File>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM files WHERE upload_job_id = ? AND state = ? ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![job_id, state.as_str()], row_to_file)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Atomic insert; on duplicate `(upload_job_id, path)`, skips that row.
/// Idempotent for recovery and Monitor re-scan — re-running expansion on an
/// already-expanded job inserts zero new rows.
pub fn create_bulk(conn: &mut Connection, job_id: &str, stats: &[NewFileStat]) -> anyhow::Result<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0usize;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO files (upload_job_id, path, state, mtime, size)
             VALUES (?1, ?2, 'pending', ?3, ?4)",
        )?;
        for stat in stats {
            inserted += stmt.execute(params![job_id, stat.path, stat.mtime, stat.size])?;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

/// Atomically selects one File in PENDING, marks it IN_PROGRESS, returns it.
/// The `state = 'pending'` guard in the subquery makes concurrent claims
/// across workers mutually exclusive under SQLite's single-writer model.
pub fn claim_next_pending(conn: &Connection, job_id: &str) -> anyhow::Result<Option<File>> {
    let mut stmt = conn.prepare(
        "UPDATE files SET state = 'in_progress', updated_at = datetime('now')
         WHERE id = (
             SELECT id FROM files
             WHERE upload_job_id = ?1 AND state = 'pending'
             ORDER BY id ASC LIMIT 1
         )
         RETURNING *",
    )?;
    let mut rows = stmt.query_map(params![job_id], row_to_file)?;
    Ok(rows.next().transpose()?)
}

/// Transactional update; bumps `updated_at`.
pub fn mark(
    conn: &Connection,
    file_id: i64,
    state: FileState,
    failure_reason: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE files SET state = ?, failure_reason = ?, updated_at = datetime('now') WHERE id = ?",
        params![state.as_str(), failure_reason, file_id],
    )?;
    Ok(())
}

/// Used by the Worker before a (re)upload and by the Monitor to re-enqueue a
/// changed file: the just-observed stat becomes the canonical record.
pub fn update_stat(
    conn: &Connection,
    file_id: i64,
    mtime: i64,
    size: i64,
    state: FileState,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE files SET mtime = ?, size = ?, state = ?, updated_at = datetime('now') WHERE id = ?",
        params![mtime, size, state.as_str(), file_id],
    )?;
    Ok(())
}

/// A process restart drops all in-memory ownership of IN_PROGRESS files —
/// whatever Worker held one is gone, so recovery resets them to PENDING
/// before a fresh Worker Pool starts claiming. Returns the count reset.
pub fn reset_orphaned_in_progress(conn: &Connection, job_id: &str) -> anyhow::Result<usize> {
    let n = conn.execute(
        "UPDATE files SET state = 'pending', updated_at = datetime('now')
         WHERE upload_job_id = ? AND state = 'in_progress'",
        params![job_id],
    )?;
    Ok(n)
}
