//! Bucket-name validation and object-path cleaning, shared by `object_store` (which
//! enforces them on every call) and `blockfmt`/`catalog` (which build paths like
//! `"{db}/{table}/index"` and must not silently accept a malformed one).

/// Validates a bucket name against the S3 naming rules:
/// 3-63 chars, lowercase ascii/digits/`-`/`.`, no `xn--` prefix, no `-s3alias`
/// suffix, no adjacent dots, no IPv4-literal shape, and must start/end with a
/// letter or digit.
pub fn validate_bucket(name: &str) -> bool {
    if name.len() < 3 || name.len() > 63 {
        return false;
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return false;
    }
    let first = name.as_bytes()[0];
    let last = name.as_bytes()[name.len() - 1];
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return false;
    }
    if !(last.is_ascii_lowercase() || last.is_ascii_digit()) {
        return false;
    }
    if name.starts_with("xn--") {
        return false;
    }
    if name.ends_with("-s3alias") {
        return false;
    }
    if name.contains("..") {
        return false;
    }
    if looks_like_ipv4(name) {
        return false;
    }
    true
}

fn looks_like_ipv4(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|p| {
        !p.is_empty()
            && p.len() <= 3
            && p.bytes().all(|b| b.is_ascii_digit())
            && p.parse::<u32>().map(|v| v <= 255).unwrap_or(false)
    })
}

/// Cleans and validates a slash-separated object path: no leading `/`, no empty
/// segment, no `.` or `..` segment.
pub fn clean_path(path: &str) -> Option<&str> {
    if path.is_empty() || path.starts_with('/') {
        return None;
    }
    for seg in path.split('/') {
        if seg.is_empty() || seg == "." || seg == ".." {
            return None;
        }
    }
    Some(path)
}

/// The manifest path convention: `"{db}/{table}/index"`.
pub fn index_path(db: &str, table: &str) -> String {
    format!("{db}/{table}/index")
}

/// Compares two paths the way `WalkDir`'s seek logic must: as a sequence of
/// segments, not as an opaque byte string split at arbitrary positions. Two paths
/// that diverge within a shared prefix are ordered by the segment in which they
/// diverge, compared as a whole unit — so a segment boundary (`/`) is never treated
/// as "just another byte" that happens to sort between `.` and `0`. For full paths
/// this coincides with ordinary codepoint order (`pathcmp("a/b", "a.b")` is not
/// `Less`, already holds under codepoint order because `/` sorts after `.`); the
/// distinction matters once `WalkDir` needs to decide whether `seek` lies inside
/// a subtree it is about to skip.
pub fn path_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_accept() {
        for name in [
            "docexamplebucket1",
            "log-delivery-march-2020",
            "a-b-c-1.2.3",
        ] {
            assert!(validate_bucket(name), "{name} should be accepted");
        }
    }

    #[test]
    fn bucket_reject() {
        for name in [
            "Doc",
            "doc_",
            "doc-",
            "-doc",
            "ab",
            "xn--doc",
            "doc-s3alias",
            "192.168.0.1",
        ] {
            assert!(!validate_bucket(name), "{name} should be rejected");
        }
    }

    #[test]
    fn path_segment_order() {
        assert_ne!(path_cmp("a/b", "a.b"), std::cmp::Ordering::Less);
    }

    #[test]
    fn path_cleaning() {
        assert_eq!(clean_path("a/b/c"), Some("a/b/c"));
        assert_eq!(clean_path("/a"), None);
        assert_eq!(clean_path("a//b"), None);
        assert_eq!(clean_path("a/../b"), None);
        assert_eq!(clean_path("a/./b"), None);
        assert_eq!(clean_path(""), None);
    }
}
