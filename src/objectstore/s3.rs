use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;

use super::{MultipartHandle, ObjectStore, StoreError, StoreResult, UploadedPart};

/// The concrete S3-compatible backend. Works against AWS S3 and any
/// S3-compatible endpoint (MinIO, R2, ...) via the configured endpoint URL.
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn from_config(
        endpoint: Option<&str>,
        region: &str,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.to_string()));
        if let (Some(access_key), Some(secret_key)) = (access_key, secret_key) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "upload-engine",
            ));
        }
        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

/// S3 returns 5xx and throttling as retryable; everything else (bad bucket,
/// access denied, malformed key) is permanent. Dispatch errors (DNS, TLS,
/// timeout) are treated as transient — the caller's backoff will reattempt.
fn classify<E: std::fmt::Debug>(context: &str, err: SdkError<E>) -> StoreError {
    match &err {
        SdkError::ServiceError(service_err) => {
            let raw = service_err.raw();
            let status = raw.status().as_u16();
            if status >= 500 || status == 429 {
                StoreError::Transient(format!("{context}: HTTP {status}"))
            } else {
                StoreError::Permanent(format!("{context}: HTTP {status}: {err:?}"))
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            StoreError::Transient(format!("{context}: {err:?}"))
        }
        _ => StoreError::Permanent(format!("{context}: {err:?}")),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: bytes::Bytes) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify("put_object", e))?;
        Ok(())
    }

    async fn initiate_multipart(&self, bucket: &str, key: &str) -> StoreResult<MultipartHandle> {
        let out = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("create_multipart_upload", e))?;
        let upload_id = out
            .upload_id()
            .ok_or_else(|| StoreError::Permanent("missing upload_id in response".into()))?;
        Ok(MultipartHandle(format!("{bucket}\u{0}{key}\u{0}{upload_id}")))
    }

    async fn put_part(
        &self,
        handle: &MultipartHandle,
        part_number: i32,
        body: bytes::Bytes,
    ) -> StoreResult<UploadedPart> {
        let (bucket, key, upload_id) = split_handle(handle)?;
        let out = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify("upload_part", e))?;
        let e_tag = out
            .e_tag()
            .ok_or_else(|| StoreError::Permanent("missing e_tag in upload_part response".into()))?
            .to_string();
        Ok(UploadedPart { part_number, e_tag })
    }

    async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        parts: Vec<UploadedPart>,
    ) -> StoreResult<()> {
        let (bucket, key, upload_id) = split_handle(handle)?;
        let completed_parts = parts
            .into_iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.e_tag)
                    .build()
            })
            .collect();
        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify("complete_multipart_upload", e))?;
        Ok(())
    }

    async fn abort_multipart(&self, handle: &MultipartHandle) -> StoreResult<()> {
        let (bucket, key, upload_id) = split_handle(handle)?;
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| classify("abort_multipart_upload", e))?;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<u64>> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(out) => Ok(out.content_length().map(|n| n as u64)),
            Err(SdkError::ServiceError(e)) if e.raw().status().as_u16() == 404 => Ok(None),
            Err(e) => Err(classify("head_object", e)),
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("delete_object", e))?;
        Ok(())
    }
}

fn split_handle(handle: &MultipartHandle) -> StoreResult<(&str, &str, &str)> {
    let mut parts = handle.0.splitn(3, '\u{0}');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(bucket), Some(key), Some(upload_id)) => Ok((bucket, key, upload_id)),
        _ => Err(StoreError::Permanent("malformed multipart handle".into())),
    }
}
