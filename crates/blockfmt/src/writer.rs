//! The block writer: receives `inputAlign`-sized buffers, flushes a
//! compressed frame per write, and appends a `Trailer` on `close`.

use crate::compress::{self, Compressor};
use crate::error::{Error, Result};
use crate::sparse::{Path, Range, SparseIndex};
use crate::trailer::{Blockdesc, Trailer, TRAILER_VERSION};

/// Accumulates compressed frames and their caller-supplied sparse ranges, then
/// emits a finished object body plus trailer on `close`.
pub struct Writer {
    compressor: Box<dyn Compressor>,
    block_shift: u8,
    body: Vec<u8>,
    blocks: Vec<Blockdesc>,
    sparse: SparseIndex,
    pending_chunks: u32,
    current_block_start: u64,
}

impl Writer {
    pub fn new(algo: &str, block_shift: u8) -> Result<Self> {
        Ok(Self {
            compressor: compress::by_name(algo)?,
            block_shift,
            body: Vec::new(),
            blocks: Vec::new(),
            sparse: SparseIndex::new(),
            pending_chunks: 0,
            current_block_start: 0,
        })
    }

    /// Compresses `input` (which must be exactly `1 << blockShift` bytes — the
    /// writer's contracted `inputAlign`) and appends the resulting frame.
    pub fn write(&mut self, input: &[u8]) -> Result<()> {
        let want = 1usize << self.block_shift;
        if input.len() != want {
            return Err(Error::CorruptTrailer(format!(
                "write of {} bytes does not match inputAlign {want}",
                input.len()
            )));
        }
        let frame = self.compressor.compress(input);
        self.body.extend_from_slice(&frame);
        self.pending_chunks += 1;
        Ok(())
    }

    /// Finalizes the current logical chunk into a `Blockdesc` carrying the
    /// caller-supplied per-path ranges for this block; the ranges are taken
    /// as given rather than derived from the payload.
    pub fn flush(&mut self, ranges: Vec<(Path, Range)>) {
        self.sparse.push(ranges.clone());
        self.blocks.push(Blockdesc {
            offset: self.current_block_start,
            chunks: self.pending_chunks,
            ranges,
        });
        self.pending_chunks = 0;
        self.current_block_start = self.body.len() as u64;
    }

    /// Appends the trailer and returns the complete object body.
    pub fn close(self) -> Vec<u8> {
        let offset = self.body.len() as u64;
        let trailer = Trailer {
            version: TRAILER_VERSION,
            algo: self.compressor.name().to_string(),
            block_shift: self.block_shift,
            offset,
            blocks: self.blocks,
            sparse: self.sparse,
        };
        let mut out = self.body;
        out.extend_from_slice(&trailer.encode());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::Value;

    #[test]
    fn writer_produces_valid_trailer() {
        let mut w = Writer::new("zstd", 4).unwrap(); // 16-byte blocks for the test
        let block = [7u8; 16];
        w.write(&block).unwrap();
        w.flush(vec![(vec!["t".to_string()], Range::new(Value::Int(0), Value::Int(1)))]);
        w.write(&block).unwrap();
        w.flush(vec![(vec!["t".to_string()], Range::new(Value::Int(2), Value::Int(3)))]);
        let object = w.close();
        let trailer = Trailer::decode(&object).unwrap();
        assert_eq!(trailer.blocks.len(), 2);
        assert_eq!(trailer.offset as usize, object.len() - trailer.encode().len());
    }

    #[test]
    fn write_rejects_misaligned_input() {
        let mut w = Writer::new("zstd", 4).unwrap();
        assert!(w.write(&[0u8; 3]).is_err());
    }
}
