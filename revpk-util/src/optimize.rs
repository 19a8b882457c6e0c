//! Repacking an archive with content-addressed chunk deduplication.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use sha1::{Digest, Sha1};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info, trace};

use revpk::{join_name, BlockIndex, VpkReader, VpkRef};

use crate::cancel::CancelToken;
use crate::error::{Result, UtilError};
use crate::filter::IncludeExclude;

/// Options for [`optimize`].
#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    /// Write every chunk into block 000 instead of keeping source blocks.
    pub merge: bool,
    /// Run every pass and validation but write nothing.
    pub dry_run: bool,
    /// Files to drop from the output.
    pub filter: IncludeExclude,
    /// Polled at chunk and phase boundaries.
    pub cancel: CancelToken,
}

/// What [`optimize`] did.
#[derive(Debug, Clone, Default)]
pub struct OptimizeSummary {
    pub files_kept: usize,
    pub files_excluded: usize,
    pub chunks_written: usize,
    pub bytes_written: u64,
    /// Total extent of the source blocks, for delta reporting.
    pub source_bytes: u64,
}

/// Content identity of a source chunk.
type ChunkId = (BlockIndex, u64, u64);
type ChunkDigest = [u8; 20];

enum BlockSink {
    Temp(NamedTempFile),
    Discard,
}

impl Write for BlockSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BlockSink::Temp(t) => t.as_file_mut().write(buf),
            BlockSink::Discard => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BlockSink::Temp(t) => t.as_file_mut().flush(),
            BlockSink::Discard => Ok(()),
        }
    }
}

/// Repack the archive `input` into `output_dir`, deduplicating identical
/// chunks within each target block and dropping files rejected by the
/// filter. Chunk payloads are copied verbatim, never re-encoded, and the
/// finished files are published atomically by renaming temps.
pub fn optimize(input: &VpkRef, output_dir: &Path, opts: &OptimizeOptions) -> Result<OptimizeSummary> {
    let input_dir = fs::canonicalize(&input.path)?;
    let output_canon = fs::canonicalize(output_dir)?;
    if input_dir == output_canon {
        return Err(UtilError::SameDirectory { path: output_canon });
    }

    info!("optimizing {}", input.name);
    let reader = VpkReader::open(input)?;
    let mut root = reader.root.clone();
    let mut summary = OptimizeSummary::default();

    // Extent of each source block, for the size delta.
    let mut source_extent: HashMap<BlockIndex, u64> = HashMap::new();
    for f in &root.files {
        for c in &f.chunks {
            let end = c.offset + c.compressed_size;
            let extent = source_extent.entry(f.index).or_insert(0);
            *extent = (*extent).max(end);
        }
    }
    summary.source_bytes = source_extent.values().sum();

    // Pass 1: hash every chunk's raw bytes.
    let mut chunk_hash: HashMap<ChunkId, ChunkDigest> = HashMap::new();
    for f in &root.files {
        for c in &f.chunks {
            opts.cancel.check()?;
            let id: ChunkId = (f.index, c.offset, c.compressed_size);
            if chunk_hash.contains_key(&id) {
                continue;
            }
            let mut hasher = Sha1::new();
            io::copy(&mut reader.open_chunk_raw(f, c)?, &mut hasher)?;
            chunk_hash.insert(id, hasher.finalize().into());
        }
    }
    debug!("hashed {} distinct chunks", chunk_hash.len());

    // Pass 2: drop filtered files. The first filter error is kept and
    // surfaced after the whole pass.
    opts.cancel.check()?;
    let mut filter_err = None;
    let mut kept = Vec::with_capacity(root.files.len());
    for f in std::mem::take(&mut root.files) {
        match opts.filter.skip(&f.path) {
            Ok(true) => {
                debug!("excluding {}", f.path);
                summary.files_excluded += 1;
            }
            Ok(false) => kept.push(f),
            Err(e) => {
                if filter_err.is_none() {
                    filter_err = Some(e);
                }
            }
        }
    }
    if let Some(e) = filter_err {
        return Err(e);
    }
    root.files = kept;
    summary.files_kept = root.files.len();

    // Pass 3: open a sink per distinct target block.
    let mut sinks: HashMap<BlockIndex, BlockSink> = HashMap::new();
    let open_sink = |index: BlockIndex| -> Result<BlockSink> {
        if opts.dry_run {
            return Ok(BlockSink::Discard);
        }
        let tmp = Builder::new()
            .prefix(&format!(".vpkblock{index}-"))
            .tempfile_in(output_dir)?;
        debug!("created {:?} for block {index}", tmp.path());
        Ok(BlockSink::Temp(tmp))
    };
    if opts.merge {
        sinks.insert(BlockIndex(0), open_sink(BlockIndex(0))?);
    } else {
        for f in &root.files {
            opts.cancel.check()?;
            if f.index == BlockIndex::DIR {
                return Err(UtilError::DirBlockTarget(f.path.clone()));
            }
            if !sinks.contains_key(&f.index) {
                let sink = open_sink(f.index)?;
                sinks.insert(f.index, sink);
            }
        }
    }
    info!("writing {} block(s){}", sinks.len(), if opts.merge { " (merged)" } else { "" });

    // Pass 4: copy chunks in file order, reusing any chunk already written
    // to the same target block with identical bytes.
    let mut offsets: HashMap<BlockIndex, u64> = HashMap::new();
    let mut written: HashMap<BlockIndex, HashMap<ChunkDigest, u64>> = HashMap::new();

    for fi in 0..root.files.len() {
        let source_index = root.files[fi].index;
        let target = if opts.merge { BlockIndex(0) } else { source_index };
        if target == BlockIndex::DIR {
            return Err(UtilError::DirBlockTarget(root.files[fi].path.clone()));
        }
        let source_block = reader.open_block_raw(source_index)?.clone();

        let Some(sink) = sinks.get_mut(&target) else {
            return Err(UtilError::Vpk(revpk::Error::BlockNotFound(target)));
        };
        let block_written = written.entry(target).or_default();
        let cursor = offsets.entry(target).or_insert(0);

        for ci in 0..root.files[fi].chunks.len() {
            opts.cancel.check()?;
            let chunk = root.files[fi].chunks[ci];
            let id: ChunkId = (source_index, chunk.offset, chunk.compressed_size);
            let digest = match chunk_hash.get(&id) {
                Some(digest) => *digest,
                None => {
                    let mut hasher = Sha1::new();
                    io::copy(&mut chunk.create_reader_raw(&source_block), &mut hasher)?;
                    hasher.finalize().into()
                }
            };

            if let Some(&offset) = block_written.get(&digest) {
                trace!("reusing chunk {id:?} in block {target} at {offset}");
                root.files[fi].chunks[ci].offset = offset;
                continue;
            }

            let mut src = chunk.create_reader_raw(&source_block);
            let n = io::copy(&mut src, sink)?;

            let offset = *cursor;
            block_written.insert(digest, offset);
            root.files[fi].chunks[ci].offset = offset;
            *cursor += n;

            trace!("wrote chunk {id:?} to block {target} at {offset} ({n} bytes)");
            summary.chunks_written += 1;
            summary.bytes_written += n;
        }
        root.files[fi].index = target;
    }
    info!(
        "wrote {} chunks ({} bytes, source {} bytes)",
        summary.chunks_written, summary.bytes_written, summary.source_bytes
    );

    // Pass 5: the directory. Dry runs still serialize, to exercise the
    // validation path.
    opts.cancel.check()?;
    if opts.dry_run {
        root.serialize(&mut io::sink())?;
        return Ok(summary);
    }

    let mut dir_tmp = Builder::new().prefix(".vpkdir-").tempfile_in(output_dir)?;
    {
        let mut w = io::BufWriter::new(dir_tmp.as_file_mut());
        root.serialize(&mut w)?;
        w.flush()?;
    }
    dir_tmp.as_file().sync_all()?;
    for sink in sinks.values_mut() {
        if let BlockSink::Temp(tmp) = sink {
            tmp.as_file().sync_all()?;
        }
    }

    // Publish: rename the dir first, then the blocks.
    opts.cancel.check()?;
    let dir_name = output_dir.join(join_name(&input.prefix, &input.name, BlockIndex::DIR));
    dir_tmp.persist(&dir_name)?;
    debug!("published {:?}", dir_name);
    for (index, sink) in sinks {
        if let BlockSink::Temp(tmp) = sink {
            let block_name = output_dir.join(join_name(&input.prefix, &input.name, index));
            tmp.persist(&block_name)?;
            debug!("published {:?}", block_name);
        }
    }

    Ok(summary)
}
