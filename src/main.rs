use std::sync::Arc;

use tokio::signal;
use upload_engine::config::EngineConfig;
use upload_engine::db::connection::{close_pool, create_pool};
use upload_engine::db::migrate::migrate;
use upload_engine::objectstore::s3::S3ObjectStore;
use upload_engine::state::Engine;

/// Minimal process bootstrap: the HTTP API that would sit in front of this
/// engine is a separate collaborator (§1) and isn't part of this binary.
/// This main wires config, storage, recovery, and the Monitor, then idles
/// until asked to shut down — job submission happens through `Engine`'s
/// public API, e.g. from an embedding service or a future CLI front-end.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = EngineConfig::from_env();
    tracing::info!(db = %config.database_url.display(), "starting upload engine");

    let data_dir = config
        .database_url
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    std::fs::create_dir_all(&data_dir)?;

    let db_path = config.database_url.to_string_lossy().to_string();
    let pool = create_pool(&db_path, config.worker_concurrency as u32 + 2);
    migrate(&pool, &data_dir)?;

    let store = Arc::new(
        S3ObjectStore::from_config(
            config.object_store_endpoint.as_deref(),
            &config.object_store_region,
            config.object_store_access_key.as_deref(),
            config.object_store_secret_key.as_deref(),
        )
        .await,
    );

    let engine = Arc::new(Engine::new(pool, store, config));
    engine.recover().await;
    engine.start_monitor();

    shutdown_signal().await;
    tracing::info!("shutting down...");
    engine.shutdown();

    close_pool(&engine.db);
    tracing::info!("upload engine stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
