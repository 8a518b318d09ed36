use sneller_common::{ErrorClass, ErrorKind};

/// Errors raised decoding/encoding the block format, its trailer, and the
/// structures built on top of it: structural errors are always fatal
/// for the current operation, never retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("corrupt trailer: {0}")]
    CorruptTrailer(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("corrupt list: {0}")]
    CorruptList(String),

    #[error("unknown compressor {0:?}")]
    UnknownCompressor(String),

    #[error("attempted to decode block {got} beyond configured limit {limit}")]
    BlockLimitExceeded { got: u32, limit: u32 },

    #[error(transparent)]
    ObjectStore(#[from] sneller_object_store::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorClass for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::CorruptTrailer(_) => ErrorKind::CorruptTrailer,
            Error::CorruptIndex(_) => ErrorKind::CorruptIndex,
            Error::CorruptList(_) => ErrorKind::CorruptList,
            Error::ObjectStore(e) => e.kind(),
            Error::UnknownCompressor(_) | Error::BlockLimitExceeded { .. } | Error::Io(_) => {
                ErrorKind::Other
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
