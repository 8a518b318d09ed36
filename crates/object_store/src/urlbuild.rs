//! URL construction rules: virtual-hosted-style by default, falling
//! back to path-style when the bucket name contains a dot (a dotted bucket name
//! breaks TLS SNI/cert matching against `<bucket>.s3.<region>.amazonaws.com`), with
//! an `S3_ENDPOINT` escape hatch for S3-compatible stores (MinIO, etc).

/// Builds the base URL (no path, no query) for `bucket` in `region`, honoring
/// `S3_ENDPOINT` and the virtual-host/path-style fallback rule.
pub fn bucket_base_url(bucket: &str, region: &str, endpoint_override: Option<&str>) -> String {
    if let Some(endpoint) = endpoint_override.or_else(|| option_env_s3_endpoint()) {
        let endpoint = endpoint.trim_end_matches('/');
        return format!("{endpoint}/{bucket}");
    }
    if bucket.contains('.') {
        format!("https://s3.{region}.amazonaws.com/{bucket}")
    } else {
        format!("https://{bucket}.s3.{region}.amazonaws.com")
    }
}

fn option_env_s3_endpoint() -> Option<&'static str> {
    // Resolved once per process; callers that need per-call override pass
    // `endpoint_override` explicitly instead of relying on this.
    static ENDPOINT: std::sync::OnceLock<Option<String>> = std::sync::OnceLock::new();
    ENDPOINT
        .get_or_init(|| std::env::var("S3_ENDPOINT").ok())
        .as_deref()
}

/// Escapes an object key for inclusion in a URL path: space becomes `%20`
/// (not `+`), and `/` is preserved literally as a path separator.
pub fn escape_key_path(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for segment in key.split('/') {
        if !out.is_empty() || key.starts_with('/') {
            out.push('/');
        }
        out.push_str(&percent_encode_segment(segment));
    }
    out
}

fn percent_encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_host_style_by_default() {
        let url = bucket_base_url("my-bucket", "us-east-1", None);
        assert_eq!(url, "https://my-bucket.s3.us-east-1.amazonaws.com");
    }

    #[test]
    fn path_style_for_dotted_bucket() {
        let url = bucket_base_url("my.bucket.example", "us-east-1", None);
        assert_eq!(url, "https://s3.us-east-1.amazonaws.com/my.bucket.example");
    }

    #[test]
    fn endpoint_override_wins() {
        let url = bucket_base_url("my-bucket", "us-east-1", Some("http://localhost:9000"));
        assert_eq!(url, "http://localhost:9000/my-bucket");
    }

    #[test]
    fn escapes_space_and_keeps_slash() {
        assert_eq!(escape_key_path("a b/c"), "a%20b/c");
    }
}
