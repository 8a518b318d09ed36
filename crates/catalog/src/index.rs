//! The table manifest and its partial (lazy-decode) loader. The manifest stores each descriptor's encoded trailer alongside its
//! path/etag/size so that [`Index::descs`] can skip decoding trailers for
//! descriptors a predicate has already ruled out some other way (e.g. path
//! filters applied upstream of the sparse-index check).

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use sneller_common::Timestamp;
use sneller_object_store::Filesystem;

use crate::error::{Error, Result};

/// One table manifest entry, before its trailer has been decoded.
#[derive(Debug, Clone)]
pub struct DescriptorRecord {
    pub path: String,
    pub etag: String,
    pub size: u64,
    pub last_modified: Timestamp,
    trailer_bytes: Vec<u8>,
}

/// A manifest entry with its trailer decoded — what `Index::descs` hands back
/// to a query.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub path: String,
    pub etag: String,
    pub size: u64,
    pub last_modified: Timestamp,
    pub trailer: Arc<sneller_blockfmt::Trailer>,
}

/// `{created, descriptors}`: the per-table manifest. `created` is
/// tracked monotonically so two manifests for the same table can be ordered
/// without comparing their full contents.
#[derive(Debug, Clone)]
pub struct Index {
    pub created: Timestamp,
    records: Vec<DescriptorRecord>,
}

impl Index {
    pub fn new(created: Timestamp, records: Vec<DescriptorRecord>) -> Self {
        Self { created, records }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Decodes one descriptor's trailer on demand.
    pub fn descriptor(&self, ix: usize) -> Result<Descriptor> {
        let record = self
            .records
            .get(ix)
            .ok_or_else(|| Error::CorruptIndex(format!("no such descriptor {ix}")))?;
        let trailer = sneller_blockfmt::Trailer::decode(&record.trailer_bytes)?;
        Ok(Descriptor {
            path: record.path.clone(),
            etag: record.etag.clone(),
            size: record.size,
            last_modified: record.last_modified,
            trailer: Arc::new(trailer),
        })
    }

    /// `Index.descs(fs, filter) -> (descriptors, blocks, scannedSize)`: applies
    /// `filter` to each descriptor's sparse index, keeping only blocks the
    /// filter cannot prove `Never` for, and sums the decompressed size of
    /// survivors.
    ///
    /// `fs` is accepted so a real table resolver can fetch out-of-line
    /// descriptor bodies; this implementation only needs the already-embedded
    /// trailer bytes, so it is unused here.
    pub fn descs(
        &self,
        _fs: &dyn Filesystem,
        filter: &dyn Fn(&sneller_blockfmt::SparseIndex, usize) -> sneller_blockfmt::Ternary,
    ) -> Result<(Vec<Descriptor>, Vec<(usize, u64)>, u64)> {
        let mut descriptors = Vec::new();
        let mut blocks = Vec::new();
        let mut scanned_size = 0u64;
        for ix in 0..self.records.len() {
            let desc = self.descriptor(ix)?;
            let mut any_block_survives = false;
            for block_ix in 0..desc.trailer.sparse.size() {
                if filter(&desc.trailer.sparse, block_ix) == sneller_blockfmt::Ternary::Never {
                    continue;
                }
                any_block_survives = true;
                let block_offset = desc.trailer.blocks[block_ix].offset;
                blocks.push((descriptors.len(), block_offset));
                scanned_size += sneller_blockfmt::segment_size(&desc.trailer, block_ix);
            }
            if any_block_survives {
                descriptors.push(desc);
            }
        }
        Ok((descriptors, blocks, scanned_size))
    }

    /// Readers tolerate a stale index as long as referenced ETags still
    /// resolve; `is_stale` just orders two manifests by `created` so a caller
    /// can decide whether to refresh.
    pub fn is_stale(&self, other: &Index) -> bool {
        self.created.as_micros() < other.created.as_micros()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_u64(&mut out, self.created.as_micros() as u64);
        write_u32(&mut out, self.records.len() as u32);
        for r in &self.records {
            write_str(&mut out, &r.path);
            write_str(&mut out, &r.etag);
            write_u64(&mut out, r.size);
            write_u64(&mut out, r.last_modified.as_micros() as u64);
            write_u32(&mut out, r.trailer_bytes.len() as u32);
            out.extend_from_slice(&r.trailer_bytes);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut cur = buf;
        let created = take_u64(&mut cur)? as i64;
        let n = take_u32(&mut cur)?;
        let mut records = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let path = take_str(&mut cur)?;
            let etag = take_str(&mut cur)?;
            let size = take_u64(&mut cur)?;
            let last_modified = take_u64(&mut cur)? as i64;
            let trailer_len = take_u32(&mut cur)? as usize;
            let trailer_bytes = take_n(&mut cur, trailer_len)?.to_vec();
            records.push(DescriptorRecord {
                path,
                etag,
                size,
                last_modified: Timestamp::from_micros(last_modified),
                trailer_bytes,
            });
        }
        Ok(Index {
            created: Timestamp::from_micros(created),
            records,
        })
    }
}

/// A record ready to be appended to a manifest being built; `trailer` is
/// encoded immediately so the manifest never needs to re-derive it.
pub fn new_record(
    path: impl Into<String>,
    etag: impl Into<String>,
    size: u64,
    last_modified: Timestamp,
    trailer: &sneller_blockfmt::Trailer,
) -> DescriptorRecord {
    DescriptorRecord {
        path: path.into(),
        etag: etag.into(),
        size,
        last_modified,
        trailer_bytes: trailer.encode(),
    }
}

/// `OpenPartialIndex(fs, db, table, key)`: reads the table's
/// manifest object and returns an `Index` whose descriptor trailers are
/// decoded lazily. `size` is the manifest object's current length (the caller
/// typically has it from the `stat`/`list` call that found the manifest in the
/// first place); `key` signs/authenticates the manifest when the filesystem
/// requires it, and is ignored by plain object stores.
pub async fn open_partial_index(
    fs: &dyn Filesystem,
    db: &str,
    table: &str,
    size: u64,
    _key: Option<&str>,
) -> Result<Index> {
    let path = sneller_common::path::index_path(db, table);
    let bytes = fs.open_range(&path, None, 0, size).await?;
    Index::decode(&bytes)
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

fn take_n<'a>(cur: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if cur.len() < n {
        return Err(Error::CorruptIndex("unexpected end of manifest".to_string()));
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
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::CorruptIndex(format!("non-utf8 string: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sneller_blockfmt::{Blockdesc, SparseIndex, Trailer, TRAILER_VERSION};

    fn sample_trailer() -> Trailer {
        Trailer {
            version: TRAILER_VERSION,
            algo: "zstd".to_string(),
            block_shift: 10,
            offset: 1024,
            blocks: vec![Blockdesc {
                offset: 0,
                chunks: 1,
                ranges: vec![],
            }],
            sparse: SparseIndex::new(),
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let record = new_record(
            "t/0001",
            "etag-1",
            4096,
            Timestamp::from_micros(1000),
            &sample_trailer(),
        );
        let index = Index::new(Timestamp::from_micros(5000), vec![record]);
        let encoded = index.encode();
        let decoded = Index::decode(&encoded).unwrap();
        assert_eq!(decoded.record_count(), 1);
        let desc = decoded.descriptor(0).unwrap();
        assert_eq!(desc.path, "t/0001");
        assert_eq!(desc.trailer.blocks.len(), 1);
    }

    #[test]
    fn is_stale_orders_by_created() {
        let a = Index::new(Timestamp::from_micros(100), vec![]);
        let b = Index::new(Timestamp::from_micros(200), vec![]);
        assert!(a.is_stale(&b));
        assert!(!b.is_stale(&a));
    }

    #[tokio::test]
    async fn descs_filters_never_blocks() {
        let record = new_record(
            "t/0001",
            "etag-1",
            4096,
            Timestamp::from_micros(0),
            &sample_trailer(),
        );
        let index = Index::new(Timestamp::from_micros(0), vec![record]);
        let memfs = sneller_object_store::MemFs::new();
        let (descs, blocks, _scanned) = index
            .descs(&memfs, &|_sparse, _block| sneller_blockfmt::Ternary::Maybe)
            .unwrap();
        assert_eq!(descs.len(), 1);
        assert_eq!(blocks.len(), 1);

        let (descs, blocks, _scanned) = index
            .descs(&memfs, &|_sparse, _block| sneller_blockfmt::Ternary::Never)
            .unwrap();
        assert!(descs.is_empty());
        assert!(blocks.is_empty());
    }
}
