use std::path::Path;
use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoff;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::objectstore::{ObjectStore, UploadedPart};

/// Uploads one file as a sequence of parts, sequentially — a single worker
/// holds at most one chunk in memory at a time (§6 memory discipline).
/// Parts upload in order; the object store sees them as part numbers 1..N.
pub async fn upload_multipart(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    path: &Path,
    chunk_size: u64,
    retry_attempts: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let handle = store
        .initiate_multipart(bucket, key)
        .await
        .map_err(classify)?;

    let mut file = File::open(path).await?;
    let mut part_number = 1i32;
    let mut parts = Vec::new();

    let result: Result<()> = async {
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Source("upload cancelled".into()));
            }
            let chunk = read_chunk(&mut file, chunk_size).await?;
            if chunk.is_empty() {
                break;
            }
            let part = upload_part_with_retry(store, &handle, part_number, chunk, retry_attempts)
                .await?;
            parts.push(part);
            part_number += 1;
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            store
                .complete_multipart(&handle, parts)
                .await
                .map_err(classify)?;
            Ok(())
        }
        Err(e) => {
            let _ = store.abort_multipart(&handle).await;
            Err(e)
        }
    }
}

async fn read_chunk(file: &mut File, chunk_size: u64) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(chunk_size as usize);
    buf.resize(chunk_size as usize, 0);
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf.freeze())
}

async fn upload_part_with_retry(
    store: &dyn ObjectStore,
    handle: &crate::objectstore::MultipartHandle,
    part_number: i32,
    body: Bytes,
    max_attempts: u32,
) -> Result<UploadedPart> {
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_interval: Duration::from_secs(10),
        max_elapsed_time: Some(Duration::from_secs(120)),
        ..ExponentialBackoff::default()
    };
    let mut attempt = 0u32;
    retry(policy, || {
        let body = body.clone();
        attempt += 1;
        async move {
            match store.put_part(handle, part_number, body).await {
                Ok(part) => Ok(part),
                Err(e) if attempt >= max_attempts => {
                    Err(backoff::Error::permanent(classify(e)))
                }
                Err(crate::objectstore::StoreError::Permanent(msg)) => {
                    Err(backoff::Error::permanent(EngineError::Permanent(msg)))
                }
                Err(e) => Err(backoff::Error::transient(classify(e))),
            }
        }
    })
    .await
}

fn classify(err: crate::objectstore::StoreError) -> EngineError {
    use crate::objectstore::StoreError;
    match err {
        StoreError::Transient(m) => EngineError::Transient(m),
        StoreError::Permanent(m) => EngineError::Permanent(m),
        StoreError::NotFound(m) => EngineError::Permanent(format!("not found: {m}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objectstore::mock::MockObjectStore;

    #[tokio::test]
    async fn transient_failures_are_retried_then_succeed() {
        let store = MockObjectStore::new();
        // Part 2 (of 3) fails twice, then succeeds on the third attempt.
        store.fail_part_times(2, 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three_parts.bin");
        std::fs::write(&path, vec![9u8; 15]).unwrap();

        upload_multipart(&store, "bucket", "key", &path, 5, 5, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.object("bucket", "key").unwrap().len(), 15);
        assert_eq!(store.aborted_uploads(), 0, "no abort_multipart on eventual success");
    }

    #[tokio::test]
    async fn exhausting_retries_aborts_the_upload() {
        let store = MockObjectStore::new();
        store.fail_part_times(1, 10);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one_part.bin");
        std::fs::write(&path, vec![1u8; 5]).unwrap();

        let err = upload_multipart(&store, "bucket", "key", &path, 5, 2, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Permanent(_) | EngineError::Transient(_)));
        assert_eq!(store.aborted_uploads(), 1);
        assert!(store.object("bucket", "key").is_none());
    }
}
