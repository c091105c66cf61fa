/// Error taxonomy per §7. No HTTP boundary in this crate (the API surface is
/// an external collaborator, §1) — callers match on the variant directly.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job already exists: {0}")]
    JobExists(String),

    #[error("file not found: {0}")]
    FileNotFound(i64),

    /// Source filesystem errors (missing, unreadable, vanished mid-upload).
    #[error("source error: {0}")]
    Source(String),

    /// Permanent object-store errors (4xx other than throttling, verification
    /// mismatch after upload). Not retried.
    #[error("permanent object-store error: {0}")]
    Permanent(String),

    /// Transient object-store errors (timeouts, throttling, 5xx). Retried up
    /// to `part_retry_attempts` with exponential backoff.
    #[error("transient object-store error: {0}")]
    Transient(String),

    /// Post-upload `head_object` size check failed. Not retried — the
    /// uploaded object is deleted and the file is marked permanently failed.
    #[error("{0}")]
    Verification(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
