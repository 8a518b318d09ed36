//! The table manifest and partial index loader: lists
//! block-format descriptors, their ETags, and sparse indexes for a table, with
//! lazy per-descriptor trailer decoding.

pub mod error;
pub mod index;

pub use error::{Error, Result};
pub use index::{new_record, open_partial_index, Descriptor, DescriptorRecord, Index};
