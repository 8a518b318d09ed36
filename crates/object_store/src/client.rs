use std::sync::Arc;

use bytes::Bytes;
use sneller_common::path::validate_bucket;
use sneller_common::{ObjectStoreConfig, Timestamp};

use crate::body::RewindableBody;
use crate::error::{Error, Result};
use crate::info::{Entry, Info, ObjectSummary, Page};
use crate::signer::Signer;
use crate::urlbuild::{bucket_base_url, escape_key_path};
use crate::xml;

/// A thin GET/PUT/DELETE/LIST client against S3. Holds a shared
/// `reqwest::Client` and `Signer`; cheap to clone (`Arc` internally), the way the
/// teacher shares its HTTP client by pointer across `ObjectStoreRef` instances.
#[derive(Clone)]
pub struct S3Client {
    http: reqwest::Client,
    signer: Arc<dyn Signer>,
    region: String,
    endpoint_override: Option<String>,
    config: ObjectStoreConfig,
}

impl S3Client {
    pub fn new(signer: Arc<dyn Signer>, region: impl Into<String>, config: ObjectStoreConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.dial_timeout)
            .pool_max_idle_per_host(config.idle_connections_per_host)
            .timeout(config.response_header_timeout)
            .build()?;
        Ok(Self {
            http,
            signer,
            region: region.into(),
            endpoint_override: std::env::var("S3_ENDPOINT").ok(),
            config,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    fn base_url(&self, bucket: &str) -> Result<String> {
        if !validate_bucket(bucket) {
            return Err(Error::InvalidBucket(bucket.to_string()));
        }
        Ok(bucket_base_url(
            bucket,
            &self.region,
            self.endpoint_override.as_deref(),
        ))
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<String> {
        Ok(format!("{}/{}", self.base_url(bucket)?, escape_key_path(key)))
    }

    /// Builds, signs, and issues a request, retrying exactly once on 500/503 when
    /// `body` is rewindable. Each attempt is signed fresh (a
    /// SigV4 signature embeds its own timestamp, so a stale signature can't be
    /// replayed verbatim on retry).
    async fn execute_with_retry(
        &self,
        method: &http::Method,
        url: &str,
        extra_headers: &[(&str, String)],
        body: &RewindableBody,
    ) -> Result<reqwest::Response> {
        let attempts = if body_is_replayable(body) {
            1 + self.config.retry_count
        } else {
            1
        };
        let mut last_err = None;
        for attempt in 0..attempts {
            let signed = self.build_signed_request(method, url, extra_headers, body)?;
            let resp = self.http.execute(signed).await;
            match resp {
                Ok(r) if is_retryable_status(r.status().as_u16()) => {
                    tracing::warn!(status = %r.status(), attempt, "transient S3 error, retrying");
                    last_err = Some(Error::Transient {
                        status: r.status().as_u16(),
                        message: "server error".to_string(),
                    });
                    continue;
                }
                Ok(r) => return Ok(r),
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt + 1 < attempts => {
                    tracing::warn!(error = %e, attempt, "transient transport error, retrying");
                    last_err = Some(Error::Transport(e));
                    continue;
                }
                Err(e) => return Err(Error::Transport(e)),
            }
        }
        Err(last_err.expect("attempts >= 1"))
    }

    /// Builds an `http::Request`, hands it to the `Signer`, then converts the
    /// signed headers over to a `reqwest::Request` for actual transport.
    fn build_signed_request(
        &self,
        method: &http::Method,
        url: &str,
        extra_headers: &[(&str, String)],
        body: &RewindableBody,
    ) -> Result<reqwest::Request> {
        let mut builder = http::Request::builder().method(method.clone()).uri(url);
        for (k, v) in extra_headers {
            builder = builder.header(*k, v.clone());
        }
        let mut req = builder
            .body(body.as_bytes())
            .map_err(|e| Error::Signing(e.to_string()))?;
        self.signer.sign(&mut req)?;

        let mut reqw = reqwest::Request::new(
            method.clone(),
            reqwest::Url::parse(url).map_err(|e| Error::Signing(e.to_string()))?,
        );
        for (name, value) in req.headers() {
            reqw.headers_mut().insert(name.clone(), value.clone());
        }
        *reqw.body_mut() = Some(reqwest::Body::from(req.body().clone()));
        Ok(reqw)
    }

    /// `stat(bucket, key) -> Info | NotExist`.
    pub async fn stat(&self, bucket: &str, key: &str) -> Result<Info> {
        let url = self.object_url(bucket, key)?;
        let resp = self
            .send_signed(http::Method::HEAD, &url, &[], RewindableBody::Empty)
            .await?;
        classify_status(resp.status().as_u16(), bucket, key, None)?;
        info_from_headers(resp.headers())
    }

    /// `open(bucket, key) -> Reader`. Returns the full object body.
    pub async fn open(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.range_raw(bucket, key, None, None, None).await
    }

    /// `range(bucket, key, etag, off, width) -> ReadStream` with `If-Match` when an
    /// ETag is supplied.
    pub async fn range(
        &self,
        bucket: &str,
        key: &str,
        etag: Option<&str>,
        off: u64,
        width: u64,
    ) -> Result<Bytes> {
        self.range_raw(bucket, key, etag, Some(off), Some(width))
            .await
    }

    async fn range_raw(
        &self,
        bucket: &str,
        key: &str,
        etag: Option<&str>,
        off: Option<u64>,
        width: Option<u64>,
    ) -> Result<Bytes> {
        let url = self.object_url(bucket, key)?;
        let mut headers: Vec<(&str, String)> = Vec::new();
        if let (Some(off), Some(width)) = (off, width) {
            headers.push(("Range", format!("bytes={}-{}", off, off + width - 1)));
        }
        if let Some(etag) = etag {
            headers.push(("If-Match", etag.to_string()));
        }
        let resp = self
            .send_signed(http::Method::GET, &url, &headers, RewindableBody::Empty)
            .await?;
        let status = resp.status().as_u16();
        if status == 412 {
            let actual = resp
                .headers()
                .get("etag")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(Error::EtagChanged {
                bucket: bucket.to_string(),
                key: key.to_string(),
                expected: etag.unwrap_or_default().to_string(),
                actual,
            });
        }
        classify_status(status, bucket, key, None)?;
        Ok(resp.bytes().await?)
    }

    /// `put(bucket, key, bytes) -> ETag`.
    pub async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<String> {
        let url = self.object_url(bucket, key)?;
        let body = RewindableBody::from(data);
        let resp = self
            .send_signed(http::Method::PUT, &url, &[], body)
            .await?;
        classify_status(resp.status().as_u16(), bucket, key, None)?;
        resp.headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_matches('"').to_string())
            .ok_or_else(|| Error::Other {
                status: resp.status().as_u16(),
                message: "missing ETag in PUT response".to_string(),
            })
    }

    /// `delete(bucket, key)`.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let url = self.object_url(bucket, key)?;
        let resp = self
            .send_signed(http::Method::DELETE, &url, &[], RewindableBody::Empty)
            .await?;
        classify_status(resp.status().as_u16(), bucket, key, None)?;
        Ok(())
    }

    /// `list(bucket, prefix, delimiter, startAfter, continuationToken) -> Page`
    /// using `list-type=2`.
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        start_after: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<Page> {
        let base = self.base_url(bucket)?;
        let mut url = url::Url::parse(&base).map_err(|_| Error::InvalidBucket(bucket.to_string()))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("list-type", "2");
            q.append_pair("prefix", prefix);
            if let Some(d) = delimiter {
                q.append_pair("delimiter", d);
            }
            if let Some(s) = start_after {
                q.append_pair("start-after", s);
            }
            if let Some(t) = continuation_token {
                q.append_pair("continuation-token", t);
            }
        }
        let resp = self
            .send_signed(http::Method::GET, url.as_str(), &[], RewindableBody::Empty)
            .await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        if status != 200 {
            return Err(status_to_error(status, &body, bucket, prefix));
        }
        let parsed: xml::ListBucketResult = quick_xml::de::from_reader(body.as_ref())
            .map_err(|e| Error::Other {
                status,
                message: format!("malformed ListBucketResult: {e}"),
            })?;
        let mut entries = Vec::with_capacity(parsed.contents.len() + parsed.common_prefixes.len());
        for c in parsed.contents {
            entries.push(Entry::Object {
                key: c.key,
                info: ObjectSummary {
                    etag: c.etag.trim_matches('"').to_string(),
                    size: c.size,
                    last_modified: parse_last_modified(&c.last_modified),
                },
            });
        }
        for p in parsed.common_prefixes {
            entries.push(Entry::CommonPrefix { prefix: p.prefix });
        }
        Ok(Page {
            entries,
            next_continuation_token: if parsed.is_truncated {
                parsed.next_continuation_token
            } else {
                None
            },
        })
    }

    /// `bucketRegion(bucket)`: `GET /?location=`; 403 means "trust the configured
    /// region", an empty/null response means `us-east-1`.
    pub async fn bucket_region(&self, bucket: &str) -> Result<String> {
        if !validate_bucket(bucket) {
            return Err(Error::InvalidBucket(bucket.to_string()));
        }
        let base = bucket_base_url(bucket, "us-east-1", self.endpoint_override.as_deref());
        let url = format!("{base}/?location=");
        let resp = self
            .send_signed(http::Method::GET, &url, &[], RewindableBody::Empty)
            .await?;
        if resp.status().as_u16() == 403 {
            return Ok(self.region.clone());
        }
        let body = resp.bytes().await?;
        let text = String::from_utf8_lossy(&body);
        let region = text
            .split(['>', '<'])
            .find(|s| !s.is_empty() && !s.starts_with('?') && !s.contains("LocationConstraint"))
            .unwrap_or("")
            .trim();
        if region.is_empty() {
            Ok("us-east-1".to_string())
        } else {
            Ok(region.to_string())
        }
    }

    /// `POST ?uploads` — initiates a multipart upload, returning its upload ID.
    pub async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let url = format!("{}?uploads=", self.object_url(bucket, key)?);
        let resp = self
            .send_signed(http::Method::POST, &url, &[], RewindableBody::Empty)
            .await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        if status != 200 {
            return Err(status_to_error(status, &body, bucket, key));
        }
        xml::parse_initiate_multipart_upload(&body).map_err(|e| Error::Other {
            status,
            message: format!("malformed InitiateMultipartUploadResult: {e}"),
        })
    }

    /// `PUT ?partNumber=N&uploadId=U` — uploads one part, returning its ETag.
    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        let url = format!(
            "{}?partNumber={}&uploadId={}",
            self.object_url(bucket, key)?,
            part_number,
            upload_id
        );
        let resp = self
            .send_signed(http::Method::PUT, &url, &[], RewindableBody::from(data))
            .await?;
        classify_status(resp.status().as_u16(), bucket, key, None)?;
        resp.headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_matches('"').to_string())
            .ok_or_else(|| Error::Other {
                status: resp.status().as_u16(),
                message: "missing ETag in UploadPart response".to_string(),
            })
    }

    /// `PUT ?partNumber=N&uploadId=U` with `x-amz-copy-source`, for server-side
    /// copy into one part of a multipart upload.
    pub async fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        source_bucket: &str,
        source_key: &str,
    ) -> Result<String> {
        let url = format!(
            "{}?partNumber={}&uploadId={}",
            self.object_url(bucket, key)?,
            part_number,
            upload_id
        );
        let copy_source = format!("/{}/{}", source_bucket, escape_key_path(source_key));
        let headers = [("x-amz-copy-source", copy_source)];
        let resp = self
            .send_signed(http::Method::PUT, &url, &headers, RewindableBody::Empty)
            .await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        if status != 200 || xml::is_error_body(&body) {
            return Err(status_to_error(status, &body, bucket, key));
        }
        xml::parse_copy_part_result(&body).map_err(|e| Error::Other {
            status,
            message: format!("malformed CopyPartResult: {e}"),
        })
    }

    /// `POST ?uploadId=U` with a `CompleteMultipartUpload` body listing parts in
    /// ascending part-number order.
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[(u32, String)],
    ) -> Result<String> {
        let mut sorted = parts.to_vec();
        sorted.sort_by_key(|(n, _)| *n);
        let url = format!("{}?uploadId={}", self.object_url(bucket, key)?, upload_id);
        let body = xml::complete_multipart_upload_body(&sorted);
        let resp = self
            .send_signed(
                http::Method::POST,
                &url,
                &[],
                RewindableBody::from(Bytes::from(body)),
            )
            .await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        if status != 200 {
            return Err(status_to_error(status, &body, bucket, key));
        }
        if xml::is_error_body(&body) {
            let message = xml::extract_error_message(&body).unwrap_or_default();
            return Err(Error::Other { status, message });
        }
        xml::parse_complete_multipart_upload(&body).map_err(|e| Error::Other {
            status,
            message: format!("malformed CompleteMultipartUploadResult: {e}"),
        })
    }

    /// `DELETE ?uploadId=U` — aborts an in-progress multipart upload, releasing
    /// any parts already stored.
    pub async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        let url = format!("{}?uploadId={}", self.object_url(bucket, key)?, upload_id);
        let resp = self
            .send_signed(http::Method::DELETE, &url, &[], RewindableBody::Empty)
            .await?;
        classify_status(resp.status().as_u16(), bucket, key, None)?;
        Ok(())
    }

    async fn send_signed(
        &self,
        method: http::Method,
        url: &str,
        headers: &[(&str, String)],
        body: RewindableBody,
    ) -> Result<reqwest::Response> {
        self.execute_with_retry(&method, url, headers, &body).await
    }

    pub(crate) fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn base(&self, bucket: &str) -> Result<String> {
        self.base_url(bucket)
    }

    pub(crate) fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }
}

fn body_is_replayable(body: &RewindableBody) -> bool {
    matches!(body, RewindableBody::Empty | RewindableBody::Bytes(_))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 503)
}

fn classify_status(status: u16, bucket: &str, key: &str, _etag: Option<&str>) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        404 => Err(Error::NotExist {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }),
        412 => Err(Error::PreconditionFailed(format!("{bucket}/{key}"))),
        500 | 503 => Err(Error::Transient {
            status,
            message: "server error".to_string(),
        }),
        other => Err(Error::Other {
            status: other,
            message: format!("unexpected status for {bucket}/{key}"),
        }),
    }
}

fn status_to_error(status: u16, body: &[u8], bucket: &str, key: &str) -> Error {
    if status == 404 {
        return Error::NotExist {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
    }
    let message = xml::extract_error_message(body)
        .unwrap_or_else(|| format!("http status {status}"));
    if matches!(status, 500 | 503) {
        Error::Transient { status, message }
    } else {
        Error::Other { status, message }
    }
}

fn info_from_headers(headers: &http::HeaderMap) -> Result<Info> {
    let etag = headers
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string())
        .ok_or_else(|| Error::Other {
            status: 200,
            message: "missing ETag header".to_string(),
        })?;
    let size = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    let last_modified = headers
        .get("last-modified")
        .and_then(|v| v.to_str().ok())
        .map(parse_last_modified)
        .unwrap_or(Timestamp::from_micros(0));
    Ok(Info {
        etag,
        size,
        align: 1,
        last_modified,
        ephemeral: false,
    })
}

/// Parses an RFC 2822 `Last-Modified`/XML `LastModified` string into a
/// microsecond timestamp. Falls back to `0` (epoch) on a format this client
/// doesn't recognize rather than failing the whole read, since the freshness
/// check built on top of it is gated off by default.
fn parse_last_modified(s: &str) -> Timestamp {
    httpdate::parse_http_date(s)
        .map(|t| {
            let micros = t
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_micros() as i64)
                .unwrap_or(0);
            Timestamp::from_micros(micros)
        })
        .or_else(|_| {
            // RFC 3339, as used in ListBucketResult's <LastModified>.
            parse_rfc3339_micros(s)
        })
        .unwrap_or(Timestamp::from_micros(0))
}

fn parse_rfc3339_micros(s: &str) -> std::result::Result<Timestamp, ()> {
    // Minimal RFC 3339 parser good enough for S3's fixed `YYYY-MM-DDTHH:MM:SS.sssZ`
    // shape; avoids pulling in a full calendar crate for one field.
    let bytes = s.as_bytes();
    if bytes.len() < 19 {
        return Err(());
    }
    let year: i64 = s[0..4].parse().map_err(|_| ())?;
    let month: i64 = s[5..7].parse().map_err(|_| ())?;
    let day: i64 = s[8..10].parse().map_err(|_| ())?;
    let hour: i64 = s[11..13].parse().map_err(|_| ())?;
    let min: i64 = s[14..16].parse().map_err(|_| ())?;
    let sec: i64 = s[17..19].parse().map_err(|_| ())?;
    let days = days_from_civil(year, month, day);
    let micros = ((days * 86_400 + hour * 3600 + min * 60 + sec) * 1_000_000) as i64;
    Ok(Timestamp::from_micros(micros))
}

/// Howard Hinnant's days-from-civil algorithm (proleptic Gregorian), the same
/// bit of math most from-scratch date handling in systems code reaches for
/// when it doesn't want a calendar crate just for this.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}
