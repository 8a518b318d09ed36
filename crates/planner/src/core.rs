//! The planner-facing facade: `{listTables, stat, uploader,
//! maxScanned, splitter}`.

use std::sync::Arc;

use sneller_blockfmt::Path;
use sneller_catalog::{open_partial_index, Descriptor};
use sneller_object_store::{Filesystem, Pattern, WalkControl};

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::filter::compile_filter;
use crate::split::Splitter;

/// One scanned block, identified by `(descriptor, offset)`.
#[derive(Debug, Clone, Copy)]
pub struct BlockRef {
    pub descriptor_index: usize,
    pub block_offset: u64,
}

/// `Input` handed to the executor: `{descriptors, blocks, fields}`.
/// `fields` is `None` when no column pruning hint was given.
pub struct Input {
    pub descriptors: Vec<Descriptor>,
    pub blocks: Vec<BlockRef>,
    pub fields: Option<Vec<Path>>,
}

/// `{filter, fields, allFields}`: a query's scan-pruning hint.
pub struct Hints {
    pub filter: Expr,
    pub fields: Option<Vec<Path>>,
    pub all_fields: bool,
}

/// The planner-facing core: wraps a `Filesystem`, a manifest cache
/// key, a scanned-bytes cap, and the splitter.
pub struct Core {
    fs: Arc<dyn Filesystem>,
    manifest_key: Option<String>,
    max_scanned: u64,
    splitter: Splitter,
}

impl Core {
    pub fn new(fs: Arc<dyn Filesystem>, npeers: u32, max_scanned: u64) -> Self {
        Self {
            fs,
            manifest_key: None,
            max_scanned,
            splitter: Splitter::new(npeers),
        }
    }

    pub fn with_manifest_key(mut self, key: impl Into<String>) -> Self {
        self.manifest_key = Some(key.into());
        self
    }

    /// `listTables(db) -> [name]`: the immediate child table
    /// directories under `db/`.
    pub async fn list_tables(&self, db: &str) -> Result<Vec<String>> {
        let prefix = format!("{db}/");
        let pattern = Pattern::compile("*")?;
        let mut names = Vec::new();
        self.fs
            .visit_dir(&prefix, None, &pattern, &mut |key, _info| {
                let name = key
                    .strip_prefix(&prefix)
                    .unwrap_or(key)
                    .trim_end_matches('/');
                if !name.is_empty() {
                    names.push(name.to_string());
                }
                WalkControl::Continue
            })
            .await?;
        Ok(names)
    }

    /// `stat(expr, hints) -> Input`: opens `table`'s manifest,
    /// compiles `expr` into a scan-pruning filter, and returns the surviving
    /// descriptors/blocks capped by `maxScanned()`.
    pub async fn stat(&self, db: &str, table: &str, manifest_size: u64, hints: Hints) -> Result<Input> {
        let index = open_partial_index(
            self.fs.as_ref(),
            db,
            table,
            manifest_size,
            self.manifest_key.as_deref(),
        )
        .await?;
        let (compiled, _ok) = compile_filter(hints.filter);
        let (descriptors, blocks, scanned) = index.descs(self.fs.as_ref(), compiled.as_ref())?;
        if scanned > self.max_scanned {
            return Err(Error::ScanLimitExceeded {
                scanned,
                limit: self.max_scanned,
            });
        }
        let fields = if hints.all_fields { None } else { hints.fields };
        Ok(Input {
            descriptors,
            blocks: blocks
                .into_iter()
                .map(|(descriptor_index, block_offset)| BlockRef {
                    descriptor_index,
                    block_offset,
                })
                .collect(),
            fields,
        })
    }

    /// `uploader() -> FS?`: the filesystem a writer should target, if
    /// this core is configured to accept writes.
    pub fn uploader(&self) -> Option<Arc<dyn Filesystem>> {
        Some(self.fs.clone())
    }

    pub fn max_scanned(&self) -> u64 {
        self.max_scanned
    }

    pub fn splitter(&self) -> &Splitter {
        &self.splitter
    }
}
