use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::{MultipartHandle, ObjectStore, StoreError, StoreResult, UploadedPart};

#[derive(Default)]
struct Upload {
    bucket: String,
    key: String,
    parts: HashMap<i32, Bytes>,
}

/// In-memory stand-in for a real bucket. Used by worker and orchestrator
/// tests; never compiled into the release binary.
#[derive(Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    uploads: Mutex<HashMap<String, Upload>>,
    next_upload_id: Mutex<u64>,
    fail_part_times: Mutex<HashMap<i32, u32>>,
    aborted_uploads: Mutex<u32>,
    corrupt_on_head: Mutex<HashSet<(String, String)>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` `put_part` calls for the given part number
    /// fail with a transient error, to exercise the Worker's retry path.
    pub fn fail_part_times(&self, part_number: i32, count: u32) {
        self.fail_part_times.lock().unwrap().insert(part_number, count);
    }

    pub fn aborted_uploads(&self) -> u32 {
        *self.aborted_uploads.lock().unwrap()
    }

    /// Makes the next `head_object` for this key report the wrong size, to
    /// exercise the Worker's post-upload verification failure path.
    pub fn corrupt_on_head(&self, bucket: &str, key: &str) {
        self.corrupt_on_head
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()));
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StoreResult<()> {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn initiate_multipart(&self, bucket: &str, key: &str) -> StoreResult<MultipartHandle> {
        let mut counter = self.next_upload_id.lock().unwrap();
        *counter += 1;
        let upload_id = counter.to_string();
        self.uploads.lock().unwrap().insert(
            upload_id.clone(),
            Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(MultipartHandle(upload_id))
    }

    async fn put_part(
        &self,
        handle: &MultipartHandle,
        part_number: i32,
        body: Bytes,
    ) -> StoreResult<UploadedPart> {
        {
            let mut remaining = self.fail_part_times.lock().unwrap();
            if let Some(count) = remaining.get_mut(&part_number) {
                if *count > 0 {
                    *count -= 1;
                    return Err(StoreError::Transient(format!(
                        "injected failure on part {part_number}"
                    )));
                }
            }
        }
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .get_mut(&handle.0)
            .ok_or_else(|| StoreError::Permanent("unknown upload id".into()))?;
        upload.parts.insert(part_number, body);
        Ok(UploadedPart {
            part_number,
            e_tag: format!("etag-{part_number}"),
        })
    }

    async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        parts: Vec<UploadedPart>,
    ) -> StoreResult<()> {
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .remove(&handle.0)
            .ok_or_else(|| StoreError::Permanent("unknown upload id".into()))?;
        let mut ordered = parts;
        ordered.sort_by_key(|p| p.part_number);
        let mut body = Vec::new();
        for part in &ordered {
            let chunk = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| StoreError::Permanent("missing uploaded part".into()))?;
            body.extend_from_slice(chunk);
        }
        self.objects
            .lock()
            .unwrap()
            .insert((upload.bucket, upload.key), Bytes::from(body));
        Ok(())
    }

    async fn abort_multipart(&self, handle: &MultipartHandle) -> StoreResult<()> {
        self.uploads.lock().unwrap().remove(&handle.0);
        *self.aborted_uploads.lock().unwrap() += 1;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<u64>> {
        let dest = (bucket.to_string(), key.to_string());
        let size = self.objects.lock().unwrap().get(&dest).map(|b| b.len() as u64);
        if let Some(size) = size {
            if self.corrupt_on_head.lock().unwrap().remove(&dest) {
                return Ok(Some(size + 1));
            }
        }
        Ok(size)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}
