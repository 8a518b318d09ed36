use sneller_common::Timestamp;

/// Metadata about a blob, returned by `stat` and attached to every `ReadStream`:
/// `{etag, size, align, lastModified, ephemeral}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub etag: String,
    pub size: u64,
    /// Required alignment of ranged reads against this blob (`1 << blockShift` for a
    /// `Compressed`/`CompressedPart`, 1 for a raw `URL`).
    pub align: u64,
    pub last_modified: Timestamp,
    /// True when the underlying object is small enough that a cache should not
    /// bother persisting it across queries.
    pub ephemeral: bool,
}

/// One entry returned by `list`/`readdir`: either a plain object or a common
/// prefix (when a `delimiter` is in effect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Object { key: String, info: ObjectSummary },
    CommonPrefix { prefix: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub etag: String,
    pub size: u64,
    pub last_modified: Timestamp,
}

/// One page of a `list` call, with the continuation token needed to fetch the next
/// page.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub entries: Vec<Entry>,
    pub next_continuation_token: Option<String>,
}
