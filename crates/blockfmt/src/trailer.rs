//! The trailer wire format: a self-describing footer located by
//! reading the final bytes of the object, carrying the block directory and the
//! sparse index. Encoding is a flat, hand-rolled binary layout — there is no
//! cross-block back-referencing to keep each block independently decodable.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::sparse::{Path, Range, SparseIndex, Value};

pub const TRAILER_VERSION: u8 = 1;
/// Size of the fixed footer the writer emits last: an 8-byte trailer length
/// followed by a 4-byte magic, so the reader knows how many trailing bytes to
/// re-read to find the start of the self-describing trailer record.
pub const FOOTER_SIZE: usize = 12;
const MAGIC: u32 = 0x534e_4c54; // "SNLT"

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blockdesc {
    pub offset: u64,
    pub chunks: u32,
    pub ranges: Vec<(Path, Range)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub version: u8,
    pub algo: String,
    pub block_shift: u8,
    pub offset: u64,
    pub blocks: Vec<Blockdesc>,
    pub sparse: SparseIndex,
}

impl Trailer {
    /// Validates the trailer's structural invariants: supported version,
    /// strictly increasing block offsets, and a consistent chunk/unit size.
    pub fn validate(&self) -> Result<()> {
        if self.version != TRAILER_VERSION {
            return Err(Error::CorruptTrailer(format!(
                "unsupported trailer version {}",
                self.version
            )));
        }
        for (i, b) in self.blocks.iter().enumerate() {
            if let Some(next) = self.blocks.get(i + 1) {
                if next.offset <= b.offset {
                    return Err(Error::CorruptTrailer(format!(
                        "block offsets not strictly increasing at index {i}"
                    )));
                }
            }
        }
        if let Some(last) = self.blocks.last() {
            if self.offset < last.offset {
                return Err(Error::CorruptTrailer(
                    "trailer.offset precedes last block's offset".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The `[start, end)` decompressed byte range one block occupies, from
    /// `chunks * (1 << blockShift)`.
    pub fn block_range(&self, block_ix: usize) -> std::ops::Range<u64> {
        let unit = 1u64 << self.block_shift;
        let start: u64 = self.blocks[..block_ix]
            .iter()
            .map(|b| b.chunks as u64 * unit)
            .sum();
        let end = start + self.blocks[block_ix].chunks as u64 * unit;
        start..end
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.version);
        out.push(self.block_shift);
        write_str(&mut out, &self.algo);
        write_u64(&mut out, self.offset);
        write_u32(&mut out, self.blocks.len() as u32);
        for b in &self.blocks {
            write_u64(&mut out, b.offset);
            write_u32(&mut out, b.chunks);
            write_u32(&mut out, b.ranges.len() as u32);
            for (path, range) in &b.ranges {
                write_path(&mut out, path);
                write_value(&mut out, &range.min);
                write_value(&mut out, &range.max);
            }
        }
        let body_len = out.len() as u64;
        write_u64(&mut out, body_len);
        write_u32(&mut out, MAGIC);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FOOTER_SIZE {
            return Err(Error::CorruptTrailer("buffer shorter than footer".to_string()));
        }
        let footer = &buf[buf.len() - FOOTER_SIZE..];
        let body_len = LittleEndian::read_u64(&footer[0..8]) as usize;
        let magic = LittleEndian::read_u32(&footer[8..12]);
        if magic != MAGIC {
            return Err(Error::CorruptTrailer("bad footer magic".to_string()));
        }
        if buf.len() < FOOTER_SIZE + body_len {
            return Err(Error::CorruptTrailer("truncated trailer body".to_string()));
        }
        let body_start = buf.len() - FOOTER_SIZE - body_len;
        let mut cur = &buf[body_start..buf.len() - FOOTER_SIZE];

        let version = take_u8(&mut cur)?;
        let block_shift = take_u8(&mut cur)?;
        let algo = take_str(&mut cur)?;
        let offset = take_u64(&mut cur)?;
        let nblocks = take_u32(&mut cur)?;
        let mut blocks = Vec::with_capacity(nblocks as usize);
        let mut sparse = SparseIndex::new();
        for _ in 0..nblocks {
            let boffset = take_u64(&mut cur)?;
            let chunks = take_u32(&mut cur)?;
            let nranges = take_u32(&mut cur)?;
            let mut ranges = Vec::with_capacity(nranges as usize);
            for _ in 0..nranges {
                let path = take_path(&mut cur)?;
                let min = take_value(&mut cur)?;
                let max = take_value(&mut cur)?;
                ranges.push((path, Range::new(min, max)));
            }
            sparse.push(ranges.clone());
            blocks.push(Blockdesc {
                offset: boffset,
                chunks,
                ranges,
            });
        }
        let trailer = Trailer {
            version,
            algo,
            block_shift,
            offset,
            blocks,
            sparse,
        };
        trailer.validate()?;
        Ok(trailer)
    }
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, v);
    out.extend_from_slice(&buf);
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, v);
    out.extend_from_slice(&buf);
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn write_path(out: &mut Vec<u8>, path: &Path) {
    write_u32(out, path.len() as u32);
    for seg in path {
        write_str(out, seg);
    }
}

fn write_value(out: &mut Vec<u8>, v: &Value) {
    match v {
        Value::Int(i) => {
            out.push(0);
            write_u64(out, *i as u64);
        }
        Value::Timestamp(t) => {
            out.push(1);
            write_u64(out, t.as_micros() as u64);
        }
        Value::Str(s) => {
            out.push(2);
            write_str(out, s);
        }
    }
}

fn take_u8(cur: &mut &[u8]) -> Result<u8> {
    let (b, rest) = cur
        .split_first()
        .ok_or_else(|| Error::CorruptTrailer("unexpected end of trailer".to_string()))?;
    *cur = rest;
    Ok(*b)
}

fn take_n<'a>(cur: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if cur.len() < n {
        return Err(Error::CorruptTrailer("unexpected end of trailer".to_string()));
    }
    let (head, tail) = cur.split_at(n);
    *cur = tail;
    Ok(head)
}

fn take_u32(cur: &mut &[u8]) -> Result<u32> {
    Ok(LittleEndian::read_u32(take_n(cur, 4)?))
}

fn take_u64(cur: &mut &[u8]) -> Result<u64> {
    Ok(LittleEndian::read_u64(take_n(cur, 8)?))
}

fn take_str(cur: &mut &[u8]) -> Result<String> {
    let len = take_u32(cur)? as usize;
    let bytes = take_n(cur, len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::CorruptTrailer(format!("non-utf8 string field: {e}")))
}

fn take_path(cur: &mut &[u8]) -> Result<Path> {
    let n = take_u32(cur)? as usize;
    let mut path = Vec::with_capacity(n);
    for _ in 0..n {
        path.push(take_str(cur)?);
    }
    Ok(path)
}

fn take_value(cur: &mut &[u8]) -> Result<Value> {
    let tag = take_u8(cur)?;
    match tag {
        0 => Ok(Value::Int(take_u64(cur)? as i64)),
        1 => Ok(Value::Timestamp(sneller_common::Timestamp::from_micros(
            take_u64(cur)? as i64,
        ))),
        2 => Ok(Value::Str(take_str(cur)?)),
        other => Err(Error::CorruptTrailer(format!("unknown value tag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trailer() -> Trailer {
        let mut sparse = SparseIndex::new();
        let ranges0 = vec![(
            vec!["t".to_string()],
            Range::new(Value::Int(0), Value::Int(9)),
        )];
        let ranges1 = vec![(
            vec!["t".to_string()],
            Range::new(Value::Int(10), Value::Int(19)),
        )];
        sparse.push(ranges0.clone());
        sparse.push(ranges1.clone());
        Trailer {
            version: TRAILER_VERSION,
            algo: "zstd".to_string(),
            block_shift: 20,
            offset: 2048,
            blocks: vec![
                Blockdesc {
                    offset: 0,
                    chunks: 1,
                    ranges: ranges0,
                },
                Blockdesc {
                    offset: 1024,
                    chunks: 1,
                    ranges: ranges1,
                },
            ],
            sparse,
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let t = sample_trailer();
        let encoded = t.encode();
        let decoded = Trailer::decode(&encoded).unwrap();
        assert_eq!(decoded, t);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut buf = sample_trailer().encode();
        let len = buf.len();
        buf[len - 1] ^= 0xff;
        assert!(Trailer::decode(&buf).is_err());
    }

    #[test]
    fn decode_rejects_non_monotone_offsets() {
        let mut t = sample_trailer();
        t.blocks[1].offset = 0;
        let encoded = t.encode();
        assert!(Trailer::decode(&encoded).is_err());
    }

    #[test]
    fn block_range_uses_chunks_and_shift() {
        let t = sample_trailer();
        assert_eq!(t.block_range(0), 0..(1 << 20));
        assert_eq!(t.block_range(1), (1 << 20)..(2 << 20));
    }
}
