//! S3's XML wire format: error bodies, list-objects-v2 pages, and the multipart
//! upload lifecycle documents. Any non-2xx is surfaced with the HTTP status and
//! any `<Message/>` text extracted from the XML body; a 200 response can still
//! carry an `<Error/>` body, which must be treated as a failure too.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
pub struct ErrorBody {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

/// Best-effort extraction of the `<Message/>` text from an XML error body. Returns
/// `None` if the body does not parse as an `<Error/>` document, in which case the
/// caller falls back to the raw HTTP status.
pub fn extract_error_message(body: &[u8]) -> Option<String> {
    quick_xml::de::from_reader::<_, ErrorBody>(body)
        .ok()
        .map(|e| {
            if e.message.is_empty() {
                e.code
            } else {
                e.message
            }
        })
}

/// True if a nominally-successful (2xx) response body is actually an `<Error/>`
/// document. S3 does this for some multipart copy failures.
pub fn is_error_body(body: &[u8]) -> bool {
    quick_xml::de::from_reader::<_, ErrorBody>(body).is_ok()
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ListBucketResult")]
pub struct ListBucketResult {
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "NextContinuationToken", default)]
    pub next_continuation_token: Option<String>,
    #[serde(rename = "Contents", default)]
    pub contents: Vec<Content>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "ETag", default)]
    pub etag: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
}

#[derive(Debug, Deserialize)]
pub struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "InitiateMultipartUploadResult")]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "CompleteMultipartUploadResult")]
pub struct CompleteMultipartUploadResult {
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "CopyPartResult")]
pub struct CopyPartResult {
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// Parses an `InitiateMultipartUploadResult` body into its upload ID.
pub fn parse_initiate_multipart_upload(body: &[u8]) -> Result<String, quick_xml::de::DeError> {
    quick_xml::de::from_reader::<_, InitiateMultipartUploadResult>(body).map(|r| r.upload_id)
}

/// Parses a `CopyPartResult` body into its ETag.
pub fn parse_copy_part_result(body: &[u8]) -> Result<String, quick_xml::de::DeError> {
    quick_xml::de::from_reader::<_, CopyPartResult>(body).map(|r| r.etag.trim_matches('"').to_string())
}

/// Parses a `CompleteMultipartUploadResult` body into its ETag.
pub fn parse_complete_multipart_upload(body: &[u8]) -> Result<String, quick_xml::de::DeError> {
    quick_xml::de::from_reader::<_, CompleteMultipartUploadResult>(body)
        .map(|r| r.etag.trim_matches('"').to_string())
}

/// Serializes the `<CompleteMultipartUpload>` request body. Parts must already be
/// in ascending part-number order.
pub fn complete_multipart_upload_body(parts: &[(u32, String)]) -> String {
    let mut body = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><CompleteMultipartUpload>"#);
    for (number, etag) in parts {
        body.push_str(&format!(
            "<Part><PartNumber>{number}</PartNumber><ETag>{}</ETag></Part>",
            quick_xml::escape::escape(etag)
        ));
    }
    body.push_str("</CompleteMultipartUpload>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_message() {
        let body = br#"<?xml version="1.0"?><Error><Code>NoSuchKey</Code><Message>boom</Message></Error>"#;
        assert_eq!(extract_error_message(body).as_deref(), Some("boom"));
    }

    #[test]
    fn detects_error_in_200() {
        let body = br#"<Error><Code>InternalError</Code><Message>copy failed</Message></Error>"#;
        assert!(is_error_body(body));
        assert!(!is_error_body(b"<CompleteMultipartUploadResult><ETag>x</ETag></CompleteMultipartUploadResult>"));
    }

    #[test]
    fn builds_complete_body_in_order() {
        let body = complete_multipart_upload_body(&[
            (1, "the-ETag-1".to_string()),
            (2, "the-ETag-2".to_string()),
        ]);
        assert!(body.find("the-ETag-1").unwrap() < body.find("the-ETag-2").unwrap());
    }
}
