//! The Object-Store Adapter (§4.2): the only module that speaks to the
//! destination bucket. Everything upstream of this trait works in terms of
//! bytes and keys, never in terms of a specific wire protocol.

pub mod s3;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use async_trait::async_trait;

/// Opaque handle for an in-flight multipart upload. The adapter is free to
/// encode whatever identifiers it needs (bucket, key, upload id) inside it;
/// callers only ever pass it back to the same adapter instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartHandle(pub String);

#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub part_number: i32,
    pub e_tag: String,
}

/// Classifies every failure the adapter can surface so the Worker knows
/// whether to retry with backoff or mark the file permanently failed.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("transient object-store error: {0}")]
    Transient(String),
    #[error("permanent object-store error: {0}")]
    Permanent(String),
    #[error("object not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The boundary between the engine and whatever bucket protocol backs it.
/// A single file's upload uses either `put_object` (small/single-shot) or
/// the `*_multipart` quartet (large files), never both.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: bytes::Bytes) -> StoreResult<()>;

    async fn initiate_multipart(&self, bucket: &str, key: &str) -> StoreResult<MultipartHandle>;

    async fn put_part(
        &self,
        handle: &MultipartHandle,
        part_number: i32,
        body: bytes::Bytes,
    ) -> StoreResult<UploadedPart>;

    async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        parts: Vec<UploadedPart>,
    ) -> StoreResult<()>;

    async fn abort_multipart(&self, handle: &MultipartHandle) -> StoreResult<()>;

    /// Used by the Worker's post-upload verification and by the recovery
    /// pass to confirm a file marked UPLOADED actually landed.
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<u64>>;

    /// Removes an object. Used to clean up after a failed post-upload
    /// verification and before a changed file is re-uploaded to the same key.
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;
}
