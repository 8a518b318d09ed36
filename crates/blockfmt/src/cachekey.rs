//! Segment cache-key and size helpers. Named in the "External
//! interfaces" section as the executor-facing contract, but implemented here
//! since they're pure functions over a `Trailer`/descriptor etag with no
//! dependency on the cache layer itself.

use crate::trailer::Trailer;

/// `"<descriptor.etag>-<blockOffset>"`.
pub fn segment_cache_key(descriptor_etag: &str, block_offset: u64) -> String {
    format!("{descriptor_etag}-{block_offset}")
}

/// `trailer.blockRange(block).end - .start`.
pub fn segment_size(trailer: &Trailer, block_ix: usize) -> u64 {
    let range = trailer.block_range(block_ix);
    range.end - range.start
}

/// A segment is "ephemeral" iff its descriptor's total size is below
/// `merge_threshold`: small objects aren't worth caching across
/// queries since refetching them is cheap relative to cache bookkeeping.
pub fn is_ephemeral(descriptor_size: u64, merge_threshold: u64) -> bool {
    descriptor_size < merge_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_format() {
        assert_eq!(segment_cache_key("abc123", 4096), "abc123-4096");
    }

    #[test]
    fn ephemeral_threshold() {
        assert!(is_ephemeral(100, 1024));
        assert!(!is_ephemeral(2048, 1024));
    }
}
