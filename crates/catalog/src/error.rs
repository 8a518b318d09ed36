use sneller_common::{ErrorClass, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error(transparent)]
    ObjectStore(#[from] sneller_object_store::Error),

    #[error(transparent)]
    Blockfmt(#[from] sneller_blockfmt::Error),
}

impl ErrorClass for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::CorruptIndex(_) => ErrorKind::CorruptIndex,
            Error::ObjectStore(e) => e.kind(),
            Error::Blockfmt(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
