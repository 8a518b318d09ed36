//! The S3 client and pattern-aware filesystem abstraction for the storage core
//!: a thin, hand-signed REST client plus the `Filesystem` trait
//! that `blockfmt`/`catalog` walk to discover blobs and table manifests.

pub mod body;
pub mod client;
pub mod error;
pub mod fs;
pub mod info;
pub mod multipart;
pub mod pattern;
pub mod signer;
pub mod urlbuild;
mod xml;

pub use body::RewindableBody;
pub use client::S3Client;
pub use error::{Error, Result};
pub use fs::{Filesystem, MemFs, S3Fs, VisitFn, WalkControl};
pub use info::{Entry, Info, ObjectSummary, Page};
pub use multipart::MultipartUpload;
pub use pattern::Pattern;
pub use signer::{NoopSigner, SigV4Signer, Signer};
