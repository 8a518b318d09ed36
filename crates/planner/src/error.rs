use sneller_common::{ErrorClass, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scan would read {scanned} bytes, over the {limit} byte limit")]
    ScanLimitExceeded { scanned: u64, limit: u64 },

    #[error(transparent)]
    Catalog(#[from] sneller_catalog::Error),

    #[error(transparent)]
    Blockfmt(#[from] sneller_blockfmt::Error),

    #[error(transparent)]
    ObjectStore(#[from] sneller_object_store::Error),
}

impl ErrorClass for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::ScanLimitExceeded { .. } => ErrorKind::Other,
            Error::Catalog(e) => e.kind(),
            Error::Blockfmt(e) => e.kind(),
            Error::ObjectStore(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
