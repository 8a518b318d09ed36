/// Behavioral classification of an error, independent of which crate raised it.
/// Every crate's concrete error type implements [`ErrorClass`] so that
/// retry/propagation logic can be written once against `ErrorKind` instead of
/// against each crate's variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A path/object was absent (HTTP 404).
    NotExist,
    /// An integrity check (ETag / If-Match) failed mid-read (HTTP 412).
    EtagChanged,
    /// A bucket name failed the S3 naming rules.
    InvalidBucket,
    /// An object path failed the fs-like cleaning rules.
    BadPath,
    /// A glob pattern was malformed (adjacent captures, repeated group, ...).
    BadPattern,
    /// The trailer footer failed to decode or validate.
    CorruptTrailer,
    /// The table manifest failed to decode or validate.
    CorruptIndex,
    /// A `List<Blob>` payload failed to decode.
    CorruptList,
    /// A transient failure (5xx, dial timeout, connection reset) eligible for the
    /// one-shot retry.
    Transient,
    /// A multipart upload could not be completed (412 on `CompleteMultipartUpload`,
    /// or an `<Error/>` body in a 200 response).
    PreconditionFailed,
    /// Anything else: classification errors surfaced as-is.
    Other,
}

impl ErrorKind {
    /// Whether this error is eligible for the single transient retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// Implemented by each crate's `Error` type so callers can classify failures
/// uniformly without downcasting.
pub trait ErrorClass {
    fn kind(&self) -> ErrorKind;
}
