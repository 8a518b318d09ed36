//! The block decoder: decompresses selected blocks of a `Trailer`
//! in order, optionally projecting down to a set of paths.

use std::collections::HashSet;
use std::io::Write;

use crate::compress;
use crate::error::{Error, Result};
use crate::sparse::Path;
use crate::trailer::Trailer;

/// Decodes blocks out of a trailer-described object body. `fields`, when set,
/// restricts decoding to the named paths (projection push-down); this codec
/// does not itself know how to drop columns mid-frame, so it is threaded
/// through to whatever row-format decoder consumes the output.
pub struct Decoder<'a> {
    trailer: &'a Trailer,
    body: &'a [u8],
    fields: Option<HashSet<Path>>,
    nblocks: u32,
}

impl<'a> Decoder<'a> {
    pub fn new(trailer: &'a Trailer, body: &'a [u8], nblocks: u32) -> Self {
        Self {
            trailer,
            body,
            fields: None,
            nblocks,
        }
    }

    pub fn with_fields(mut self, fields: HashSet<Path>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn fields(&self) -> Option<&HashSet<Path>> {
        self.fields.as_ref()
    }

    /// Decompresses block `ix` into a freshly allocated buffer.
    pub fn decompress_block(&self, ix: usize) -> Result<Vec<u8>> {
        if ix as u32 >= self.nblocks {
            return Err(Error::BlockLimitExceeded {
                got: ix as u32,
                limit: self.nblocks,
            });
        }
        let block = self
            .trailer
            .blocks
            .get(ix)
            .ok_or_else(|| Error::CorruptTrailer(format!("no such block {ix}")))?;
        let end = self
            .trailer
            .blocks
            .get(ix + 1)
            .map(|b| b.offset)
            .unwrap_or(self.trailer.offset);
        let frame = self
            .body
            .get(block.offset as usize..end as usize)
            .ok_or_else(|| Error::CorruptTrailer(format!("block {ix} out of body bounds")))?;
        let unit = 1u64 << self.trailer.block_shift;
        let decompressed_size = (block.chunks as u64 * unit) as usize;
        let compressor = compress::by_name(&self.trailer.algo)?;
        compressor.decompress(frame, decompressed_size)
    }

    /// `decompress(r, dst)`: fills a caller-provided buffer with every
    /// configured block's decompressed bytes, in order.
    pub fn decompress(&self, dst: &mut impl Write) -> Result<()> {
        for ix in 0..self.nblocks as usize {
            let bytes = self.decompress_block(ix)?;
            dst.write_all(&bytes)?;
        }
        Ok(())
    }

    /// `copy(w, r)`: streams decompressed bytes block by block.
    pub fn copy(&self, w: &mut impl Write) -> Result<u64> {
        let mut total = 0u64;
        for ix in 0..self.nblocks as usize {
            let bytes = self.decompress_block(ix)?;
            w.write_all(&bytes)?;
            total += bytes.len() as u64;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::{Range, Value};
    use crate::writer::Writer;

    #[test]
    fn decodes_blocks_in_order() {
        let mut w = Writer::new("zstd", 4).unwrap();
        w.write(&[1u8; 16]).unwrap();
        w.flush(vec![(vec!["t".into()], Range::new(Value::Int(0), Value::Int(1)))]);
        w.write(&[2u8; 16]).unwrap();
        w.flush(vec![(vec!["t".into()], Range::new(Value::Int(2), Value::Int(3)))]);
        let object = w.close();
        let trailer_len = crate::trailer::Trailer::decode(&object).unwrap().encode().len();
        let trailer = crate::trailer::Trailer::decode(&object).unwrap();
        let body = &object[..object.len() - trailer_len];

        let decoder = Decoder::new(&trailer, body, 2);
        let mut out = Vec::new();
        decoder.copy(&mut out).unwrap();
        assert_eq!(out, [[1u8; 16], [2u8; 16]].concat());
    }

    #[test]
    fn rejects_block_beyond_limit() {
        let mut w = Writer::new("zstd", 4).unwrap();
        w.write(&[1u8; 16]).unwrap();
        w.flush(vec![]);
        let object = w.close();
        let trailer = crate::trailer::Trailer::decode(&object).unwrap();
        let trailer_len = trailer.encode().len();
        let body = &object[..object.len() - trailer_len];
        let decoder = Decoder::new(&trailer, body, 1);
        assert!(decoder.decompress_block(1).is_err());
    }
}
