use sneller_common::{ErrorClass, ErrorKind};

/// The object-store client's error taxonomy. Variants map 1:1 onto the
/// behavior the caller observes, not onto HTTP plumbing details, the way
/// `HummockError` classifies by what the caller should do next rather than by
/// which internal call failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("object not found: {bucket}/{key}")]
    NotExist { bucket: String, key: String },

    #[error("etag changed for {bucket}/{key}: expected {expected}, got {actual:?}")]
    EtagChanged {
        bucket: String,
        key: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("invalid bucket name: {0}")]
    InvalidBucket(String),

    #[error("invalid object path: {0}")]
    BadPath(String),

    #[error("invalid glob pattern: {0}")]
    BadPattern(String),

    #[error("transient error calling S3 ({status}): {message}")]
    Transient { status: u16, message: String },

    #[error("multipart upload could not be completed: {0}")]
    PreconditionFailed(String),

    #[error("unexpected S3 response ({status}): {message}")]
    Other { status: u16, message: String },

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("signing error: {0}")]
    Signing(String),
}

impl ErrorClass for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NotExist { .. } => ErrorKind::NotExist,
            Error::EtagChanged { .. } => ErrorKind::EtagChanged,
            Error::InvalidBucket(_) => ErrorKind::InvalidBucket,
            Error::BadPath(_) => ErrorKind::BadPath,
            Error::BadPattern(_) => ErrorKind::BadPattern,
            Error::Transient { .. } => ErrorKind::Transient,
            Error::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Error::Other { .. } | Error::Transport(_) | Error::Signing(_) => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
