//! `List<Blob>` encoding with structural sharing: a `Compressed`
//! is assigned an `iid` on first occurrence; later references (in particular
//! every `CompressedPart` spawned from it) emit a parent-id instead of
//! re-serializing the trailer. Lists whose encoding exceeds ~16 KiB are
//! transparently whole-compressed for transport.

use std::collections::HashMap;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use sneller_object_store::Filesystem;

use crate::blob::{Blob, CompressedBlob, CompressedPartBlob, UrlBlob};
use crate::compress;
use crate::error::{Error, Result};
use crate::trailer::Trailer;

/// Lists whose raw (pre-compression) encoding exceeds this size are
/// transparently compressed for transport.
pub const COMPRESSION_THRESHOLD: usize = 16 * 1024;

const TAG_URL: u8 = 0;
const TAG_COMPRESSED_NEW: u8 = 1;
const TAG_COMPRESSED_REF: u8 = 2;
const TAG_COMPRESSED_PART: u8 = 3;

const WRAPPER_RAW: u8 = 0;
const WRAPPER_COMPRESSED: u8 = 1;

pub fn encode_list(blobs: &[Blob]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut iids: HashMap<usize, u32> = HashMap::new();
    write_u32(&mut out, blobs.len() as u32);
    for blob in blobs {
        encode_one(&mut out, blob, &mut iids)?;
    }
    wrap(out)
}

fn encode_one(out: &mut Vec<u8>, blob: &Blob, iids: &mut HashMap<usize, u32>) -> Result<()> {
    match blob {
        Blob::Url(u) => {
            out.push(TAG_URL);
            write_str(out, &u.path);
            write_str(out, &u.info.etag);
            write_u64(out, u.info.size);
            write_u64(out, u.info.align);
            write_u64(out, u.info.last_modified.as_micros() as u64);
            out.push(u.info.ephemeral as u8);
            out.push(u.skip_etag_check as u8);
        }
        Blob::Compressed(c) => {
            let key = Arc::as_ptr(&c.from) as *const () as usize ^ (Arc::as_ptr(&c.trailer) as *const () as usize);
            if let Some(&iid) = iids.get(&key) {
                out.push(TAG_COMPRESSED_REF);
                write_u32(out, iid);
            } else {
                let iid = iids.len() as u32;
                iids.insert(key, iid);
                out.push(TAG_COMPRESSED_NEW);
                write_u32(out, iid);
                encode_one(out, &c.from, iids)?;
                let trailer_bytes = c.trailer.encode();
                write_u32(out, trailer_bytes.len() as u32);
                out.extend_from_slice(&trailer_bytes);
            }
        }
        Blob::CompressedPart(p) => {
            out.push(TAG_COMPRESSED_PART);
            let compressed = Blob::Compressed(CompressedBlob {
                from: p.parent.from.clone(),
                trailer: p.parent.trailer.clone(),
            });
            encode_one(out, &compressed, iids)?;
            write_u32(out, p.start_block as u32);
            write_u32(out, p.end_block as u32);
        }
    }
    Ok(())
}

pub fn decode_list(buf: &[u8], fs: Arc<dyn Filesystem>) -> Result<Vec<Blob>> {
    let body = unwrap(buf)?;
    let mut cur = body.as_slice();
    let n = take_u32(&mut cur)?;
    let mut parents: HashMap<u32, Arc<CompressedBlob>> = HashMap::new();
    let mut out = Vec::with_capacity(n as usize);
    for _ in 0..n {
        out.push(decode_one(&mut cur, &mut parents, &fs)?);
    }
    Ok(out)
}

fn decode_one(
    cur: &mut &[u8],
    parents: &mut HashMap<u32, Arc<CompressedBlob>>,
    fs: &Arc<dyn Filesystem>,
) -> Result<Blob> {
    let tag = take_u8(cur)?;
    match tag {
        TAG_URL => {
            let path = take_str(cur)?;
            let etag = take_str(cur)?;
            let size = take_u64(cur)?;
            let align = take_u64(cur)?;
            let last_modified = take_u64(cur)? as i64;
            let ephemeral = take_u8(cur)? != 0;
            let skip_etag_check = take_u8(cur)? != 0;
            Ok(Blob::Url(UrlBlob {
                fs: fs.clone(),
                path,
                info: sneller_object_store::Info {
                    etag,
                    size,
                    align,
                    last_modified: sneller_common::Timestamp::from_micros(last_modified),
                    ephemeral,
                },
                skip_etag_check,
            }))
        }
        TAG_COMPRESSED_NEW => {
            let iid = take_u32(cur)?;
            let from = decode_one(cur, parents, fs)?;
            let trailer_len = take_u32(cur)? as usize;
            let trailer_bytes = take_n(cur, trailer_len)?;
            let trailer = Trailer::decode(trailer_bytes)
                .map_err(|e| Error::CorruptList(format!("bad embedded trailer: {e}")))?;
            let compressed = Arc::new(CompressedBlob {
                from: Arc::new(from),
                trailer: Arc::new(trailer),
            });
            parents.insert(iid, compressed.clone());
            Ok(Blob::Compressed(CompressedBlob {
                from: compressed.from.clone(),
                trailer: compressed.trailer.clone(),
            }))
        }
        TAG_COMPRESSED_REF => {
            let iid = take_u32(cur)?;
            let parent = parents
                .get(&iid)
                .ok_or_else(|| Error::CorruptList(format!("unknown iid {iid}")))?;
            Ok(Blob::Compressed(CompressedBlob {
                from: parent.from.clone(),
                trailer: parent.trailer.clone(),
            }))
        }
        TAG_COMPRESSED_PART => {
            let compressed = decode_one(cur, parents, fs)?;
            let parent = match compressed {
                Blob::Compressed(c) => Arc::new(c),
                _ => return Err(Error::CorruptList("CompressedPart parent was not Compressed".to_string())),
            };
            let start_block = take_u32(cur)? as usize;
            let end_block = take_u32(cur)? as usize;
            Ok(Blob::CompressedPart(CompressedPartBlob {
                parent,
                start_block,
                end_block,
            }))
        }
        other => Err(Error::CorruptList(format!("unknown blob tag {other}"))),
    }
}

fn wrap(raw: Vec<u8>) -> Result<Vec<u8>> {
    if raw.len() <= COMPRESSION_THRESHOLD {
        let mut out = Vec::with_capacity(raw.len() + 1);
        out.push(WRAPPER_RAW);
        out.extend_from_slice(&raw);
        return Ok(out);
    }
    let compressor = compress::by_name("zstd")?;
    let payload = compressor.compress(&raw);
    let mut out = Vec::with_capacity(payload.len() + 13);
    out.push(WRAPPER_COMPRESSED);
    write_str(&mut out, "zstd");
    write_u64(&mut out, raw.len() as u64);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn unwrap(buf: &[u8]) -> Result<Vec<u8>> {
    let mut cur = buf;
    let flag = take_u8(&mut cur)?;
    match flag {
        WRAPPER_RAW => Ok(cur.to_vec()),
        WRAPPER_COMPRESSED => {
            let name = take_str(&mut cur)?;
            let decompressed_size = take_u64(&mut cur)? as usize;
            let compressor = compress::by_name(&name)?;
            compressor.decompress(cur, decompressed_size)
        }
        other => Err(Error::CorruptList(format!("unknown list wrapper flag {other}"))),
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

fn take_u8(cur: &mut &[u8]) -> Result<u8> {
    let (b, rest) = cur
        .split_first()
        .ok_or_else(|| Error::CorruptList("unexpected end of list".to_string()))?;
    *cur = rest;
    Ok(*b)
}

fn take_n<'a>(cur: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if cur.len() < n {
        return Err(Error::CorruptList("unexpected end of list".to_string()));
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
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::CorruptList(format!("non-utf8 string: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::SparseIndex;
    use sneller_object_store::MemFs;

    fn make_url(fs: &Arc<dyn Filesystem>, path: &str, etag: &str) -> Blob {
        Blob::Url(UrlBlob {
            fs: fs.clone(),
            path: path.to_string(),
            info: sneller_object_store::Info {
                etag: etag.to_string(),
                size: 100,
                align: 1,
                last_modified: sneller_common::Timestamp::from_micros(0),
                ephemeral: false,
            },
            skip_etag_check: true,
        })
    }

    #[test]
    fn roundtrips_a_shared_compressed_blob() {
        let memfs: Arc<dyn Filesystem> = Arc::new(MemFs::new());
        let url = make_url(&memfs, "table/0001", "etag-1");
        let trailer = Arc::new(Trailer {
            version: crate::trailer::TRAILER_VERSION,
            algo: "zstd".to_string(),
            block_shift: 10,
            offset: 4096,
            blocks: vec![crate::trailer::Blockdesc {
                offset: 0,
                chunks: 4,
                ranges: vec![],
            }],
            sparse: SparseIndex::new(),
        });
        let compressed = CompressedBlob {
            from: Arc::new(url),
            trailer,
        };
        let whole = Blob::Compressed(compressed.clone());
        let part = Blob::CompressedPart(CompressedPartBlob {
            parent: Arc::new(compressed),
            start_block: 0,
            end_block: 1,
        });
        let encoded = encode_list(&[whole, part]).unwrap();
        let decoded = decode_list(&encoded, memfs).unwrap();
        assert_eq!(decoded.len(), 2);
        // the Compressed appears once in the encoding (iid 0) and the
        // CompressedPart references it instead of re-embedding the trailer.
        assert!(encoded.len() < 600);
    }

    #[test]
    fn large_list_is_compressed() {
        let memfs: Arc<dyn Filesystem> = Arc::new(MemFs::new());
        let blobs: Vec<Blob> = (0..2000)
            .map(|i| make_url(&memfs, &format!("table/{i:05}"), &format!("etag-{i}")))
            .collect();
        let encoded = encode_list(&blobs).unwrap();
        assert_eq!(encoded[0], WRAPPER_COMPRESSED);
        let decoded = decode_list(&encoded, memfs).unwrap();
        assert_eq!(decoded.len(), blobs.len());
    }
}
