use std::path::PathBuf;

/// Recognized options per §6. A single injected record; no ambient/process-wide
/// config beyond this and the State Store / Object-Store Adapter it configures.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: PathBuf,
    pub object_store_endpoint: Option<String>,
    pub object_store_region: String,
    pub object_store_access_key: Option<String>,
    pub object_store_secret_key: Option<String>,
    pub chunk_size: u64,
    pub worker_concurrency: usize,
    pub monitor_interval_secs: u64,
    pub stability_threshold_secs: i64,
    pub part_retry_attempts: u32,
    pub log_level: String,
}

/// Object-store multipart upload requires parts (other than the last) to be
/// at least 5 MiB.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

impl EngineConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            database_url: PathBuf::from(
                std::env::var("DATABASE_URL").unwrap_or_else(|_| "./data/upload-engine.db".into()),
            ),
            object_store_endpoint: std::env::var("OBJECT_STORE_ENDPOINT").ok(),
            object_store_region: std::env::var("OBJECT_STORE_REGION")
                .unwrap_or_else(|_| "us-east-1".into()),
            object_store_access_key: std::env::var("OBJECT_STORE_ACCESS_KEY").ok(),
            object_store_secret_key: std::env::var("OBJECT_STORE_SECRET_KEY").ok(),
            chunk_size: std::env::var("CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MIN_PART_SIZE),
            worker_concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            monitor_interval_secs: std::env::var("MONITOR_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            stability_threshold_secs: std::env::var("STABILITY_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            part_retry_attempts: std::env::var("PART_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }
}
