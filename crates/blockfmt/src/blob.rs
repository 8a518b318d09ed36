//! The blob model: `URL`/`Compressed`/`CompressedPart`, the
//! tagged sum that gives every blob a uniform `stat`/`reader` contract. A tagged
//! enum with methods is used here rather than a trait object, since the set of
//! blob shapes is closed and statically known.

use std::sync::Arc;

use base64::Engine;
use sha2::{Digest, Sha256};
use sneller_object_store::{Filesystem, Info};

use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::trailer::Trailer;

/// `base64url(sha256(parent.etag || marker))`: every derived blob's
/// ETag is a pure function of its parent's ETag and a marker that encodes the
/// slice, so re-deriving the same slice always produces the same ETag.
pub fn derive_etag(parent_etag: &str, marker: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_etag.as_bytes());
    hasher.update(marker.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// A ranged reader over an HTTPS resource, with `If-Match: ETag` unless a test
/// flag disables it.
#[derive(Clone)]
pub struct UrlBlob {
    pub fs: Arc<dyn Filesystem>,
    pub path: String,
    pub info: Info,
    /// Disables the `If-Match` check; only ever set by tests.
    pub skip_etag_check: bool,
}

/// A trailer-described compressed object plus the blob it reads from.
/// Owns its `Trailer` by value; shares `from` by reference with any
/// `CompressedPart` it spawns.
#[derive(Clone)]
pub struct CompressedBlob {
    pub from: Arc<Blob>,
    pub trailer: Arc<Trailer>,
}

/// A contiguous block range `[start_block, end_block)` inside a `Compressed`.
#[derive(Clone)]
pub struct CompressedPartBlob {
    pub parent: Arc<CompressedBlob>,
    pub start_block: usize,
    pub end_block: usize,
}

#[derive(Clone)]
pub enum Blob {
    Url(UrlBlob),
    Compressed(CompressedBlob),
    CompressedPart(CompressedPartBlob),
}

impl Blob {
    pub async fn stat(&self) -> Result<Info> {
        match self {
            Blob::Url(u) => Ok(u.info.clone()),
            Blob::Compressed(c) => c.from.stat().await,
            Blob::CompressedPart(p) => {
                let parent_info = p.parent.from.stat().await?;
                let marker = format!("{}-{}", p.start_block, p.end_block);
                Ok(Info {
                    etag: derive_etag(&parent_info.etag, &marker),
                    size: p.decompressed_size(),
                    align: 1 << p.parent.trailer.block_shift,
                    last_modified: parent_info.last_modified,
                    ephemeral: parent_info.ephemeral,
                })
            }
        }
    }

    /// Raw byte-range read over the blob's own addressable space
    /// (`reader(offset, width) -> ReadStream`). For `Compressed`, this reads the
    /// underlying compressed bytes (`blocks[0].offset + off`); use
    /// [`CompressedBlob::decompressor`] to get decompressed output instead.
    pub async fn reader(&self, off: u64, width: u64) -> Result<bytes::Bytes> {
        match self {
            Blob::Url(u) => {
                let etag = if u.skip_etag_check {
                    None
                } else {
                    Some(u.info.etag.as_str())
                };
                Ok(u.fs.open_range(&u.path, etag, off, width).await?)
            }
            Blob::Compressed(c) => c.read_compressed_range(off, width).await,
            Blob::CompressedPart(p) => {
                let range = p.parent.trailer.block_range(p.start_block);
                p.parent.read_compressed_range(range.start + off, width).await
            }
        }
    }
}

impl CompressedBlob {
    async fn read_compressed_range(&self, off: u64, width: u64) -> Result<bytes::Bytes> {
        let base = self.trailer.blocks.first().map_or(0, |b| b.offset);
        self.from.reader(base + off, width).await
    }

    /// Opens the full byte range `[blocks[0].offset, trailer.offset)` and
    /// decompresses every block in order.
    pub async fn decompressor(&self) -> Result<Vec<u8>> {
        let start = self.trailer.blocks.first().map_or(0, |b| b.offset);
        let width = self.trailer.offset - start;
        let bytes = self.from.reader(start, width).await?;
        let decoder = Decoder::new(&self.trailer, &bytes, self.trailer.blocks.len() as u32);
        let mut out = Vec::new();
        decoder.copy(&mut out)?;
        Ok(out)
    }

    /// Opens `[blocks[0].offset + off, +width)` and wraps in a chunk-aware
    /// decoder, with decompressed-byte addressing.
    pub async fn reader(&self, off: u64, width: u64) -> Result<Vec<u8>> {
        let full = self.decompressor().await?;
        let start = off as usize;
        let end = ((off + width) as usize).min(full.len());
        Ok(full.get(start..end).unwrap_or_default().to_vec())
    }

    /// Splits into `CompressedPart`s such that every part except possibly the
    /// last has `decompressedSize >= targetBytes`; parts are contiguous,
    /// non-overlapping, and together cover every block.
    pub fn split(self: &Arc<Self>, target_bytes: u64) -> Vec<CompressedPartBlob> {
        let unit = 1u64 << self.trailer.block_shift;
        let mut parts = Vec::new();
        let mut start = 0usize;
        let mut acc = 0u64;
        for (ix, block) in self.trailer.blocks.iter().enumerate() {
            acc += block.chunks as u64 * unit;
            if acc >= target_bytes {
                parts.push(CompressedPartBlob {
                    parent: self.clone(),
                    start_block: start,
                    end_block: ix + 1,
                });
                start = ix + 1;
                acc = 0;
            }
        }
        if start < self.trailer.blocks.len() {
            parts.push(CompressedPartBlob {
                parent: self.clone(),
                start_block: start,
                end_block: self.trailer.blocks.len(),
            });
        }
        parts
    }
}

impl CompressedPartBlob {
    pub fn decompressed_size(&self) -> u64 {
        let unit = 1u64 << self.parent.trailer.block_shift;
        self.parent.trailer.blocks[self.start_block..self.end_block]
            .iter()
            .map(|b| b.chunks as u64 * unit)
            .sum()
    }

    /// Decompresses exactly this part's block range.
    pub async fn decompressor(&self) -> Result<Vec<u8>> {
        let start = self
            .parent
            .trailer
            .blocks
            .get(self.start_block)
            .ok_or_else(|| Error::CorruptTrailer("split part start_block out of range".to_string()))?
            .offset;
        let end = self
            .parent
            .trailer
            .blocks
            .get(self.end_block)
            .map(|b| b.offset)
            .unwrap_or(self.parent.trailer.offset);
        let bytes = self.parent.from.reader(start, end - start).await?;
        // Re-root a trailer slice so the decoder's block offsets are relative to
        // `bytes` instead of the whole compressed object.
        let mut sliced = self.parent.trailer.as_ref().clone();
        sliced.blocks = sliced.blocks[self.start_block..self.end_block]
            .iter()
            .map(|b| crate::trailer::Blockdesc {
                offset: b.offset - start,
                chunks: b.chunks,
                ranges: b.ranges.clone(),
            })
            .collect();
        sliced.offset = end - start;
        let decoder = Decoder::new(&sliced, &bytes, sliced.blocks.len() as u32);
        let mut out = Vec::new();
        decoder.copy(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_etag_is_pure_function_of_inputs() {
        let a = derive_etag("parent-etag", "0-5");
        let b = derive_etag("parent-etag", "0-5");
        let c = derive_etag("parent-etag", "5-10");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
