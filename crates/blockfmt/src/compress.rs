//! The compressor registry. Framing is 1:1 with input-aligned flushes, so each
//! registered compressor only ever sees one block at a time and never reaches
//! across frame boundaries for back-references.

use crate::error::{Error, Result};

/// A named, stateless block compressor.
pub trait Compressor: Send + Sync {
    fn name(&self) -> &'static str;
    fn compress(&self, input: &[u8]) -> Vec<u8>;
    fn decompress(&self, input: &[u8], decompressed_size: usize) -> Result<Vec<u8>>;
}

pub struct Zstd {
    pub level: i32,
}

impl Compressor for Zstd {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, input: &[u8]) -> Vec<u8> {
        zstd::bulk::compress(input, self.level).expect("zstd compression is infallible for in-memory buffers")
    }

    fn decompress(&self, input: &[u8], decompressed_size: usize) -> Result<Vec<u8>> {
        zstd::bulk::decompress(input, decompressed_size)
            .map_err(|e| Error::CorruptTrailer(format!("zstd decompress failed: {e}")))
    }
}

/// Registered under the name "s2" (the Go ecosystem's Snappy-derivative this
/// codec slot is named after); implemented here with `lz4_flex`, a fast
/// byte-oriented codec equivalent in role.
pub struct Lz4;

impl Compressor for Lz4 {
    fn name(&self) -> &'static str {
        "s2"
    }

    fn compress(&self, input: &[u8]) -> Vec<u8> {
        lz4_flex::block::compress(input)
    }

    fn decompress(&self, input: &[u8], decompressed_size: usize) -> Result<Vec<u8>> {
        lz4_flex::block::decompress(input, decompressed_size)
            .map_err(|e| Error::CorruptTrailer(format!("lz4 decompress failed: {e}")))
    }
}

/// Looks up a registered compressor by its trailer `algo` name.
pub fn by_name(name: &str) -> Result<Box<dyn Compressor>> {
    match name {
        "zstd" => Ok(Box::new(Zstd { level: 3 })),
        "s2" => Ok(Box::new(Lz4)),
        other => Err(Error::UnknownCompressor(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_roundtrips() {
        let c = by_name("zstd").unwrap();
        let input = b"hello hello hello hello world".repeat(10);
        let compressed = c.compress(&input);
        let back = c.decompress(&compressed, input.len()).unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn lz4_roundtrips() {
        let c = by_name("s2").unwrap();
        let input = b"the quick brown fox".repeat(20);
        let compressed = c.compress(&input);
        let back = c.decompress(&compressed, input.len()).unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn unknown_name_errors() {
        assert!(by_name("bogus").is_err());
    }
}
