//! The block format codec, sparse index, and blob model: the
//! on-object columnar layout and the scan-pruning summaries built over it.

pub mod blob;
pub mod cachekey;
pub mod compress;
pub mod decoder;
pub mod error;
pub mod list;
pub mod sparse;
pub mod trailer;
pub mod writer;

pub use blob::{derive_etag, Blob, CompressedBlob, CompressedPartBlob, UrlBlob};
pub use cachekey::{is_ephemeral, segment_cache_key, segment_size};
pub use decoder::Decoder;
pub use error::{Error, Result};
pub use list::{decode_list, encode_list};
pub use sparse::{Path, Range, SparseIndex, Ternary, Value};
pub use trailer::{Blockdesc, Trailer, FOOTER_SIZE, TRAILER_VERSION};
pub use writer::Writer;
