//! Opening an archive family and reading its contents.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::block::{BlockHandle, SectionReader};
use crate::chunk::{ChunkReader, VpkChunk};
use crate::dir::VpkDir;
use crate::error::{Error, Result};
use crate::file::{FileReader, VpkFile};
use crate::name::VpkRef;
use crate::BlockIndex;

/// An opened archive: the parsed directory plus a handle for every block it
/// references. Block handles are shared read-only with the chunk readers cut
/// from them and released when the reader (and all derived readers) drop.
pub struct VpkReader {
    /// The parsed directory index.
    pub root: VpkDir,
    blocks: HashMap<BlockIndex, BlockHandle>,
}

impl VpkReader {
    /// Open an archive family on disk.
    pub fn open(vpk: &VpkRef) -> Result<Self> {
        debug!("opening archive {:?}", vpk.resolve(BlockIndex::DIR));
        Self::open_with(|index| BlockHandle::open(&vpk.resolve(index)))
    }

    /// Open an archive via a caller-supplied block source.
    ///
    /// `open` is called once for [`BlockIndex::DIR`] (which must yield the
    /// whole `_dir.vpk` contents) and once per distinct data block the
    /// directory references. All open failures are aggregated before
    /// reporting.
    pub fn open_with<F>(mut open: F) -> Result<Self>
    where
        F: FnMut(BlockIndex) -> Result<BlockHandle>,
    {
        let dir_block = open(BlockIndex::DIR).map_err(|e| Error::BlockOpen {
            index: BlockIndex::DIR,
            source: Box::new(e),
        })?;
        let root = VpkDir::deserialize(&mut SectionReader::new(
            dir_block.clone(),
            0,
            dir_block.len(),
        ))?;

        // Chunk offsets of DIR-indexed files are relative to the end of the
        // tree, so the dir block is the same bytes shifted to there.
        let chunk_offset = root.chunk_offset()?;
        let mut blocks = HashMap::new();
        blocks.insert(BlockIndex::DIR, dir_block.with_base(chunk_offset as u64));

        let mut errors = Vec::new();
        for f in &root.files {
            if blocks.contains_key(&f.index) {
                continue;
            }
            match open(f.index) {
                Ok(block) => {
                    blocks.insert(f.index, block);
                }
                Err(e) => errors.push(Error::BlockOpen {
                    index: f.index,
                    source: Box::new(e),
                }),
            }
        }
        Error::join(errors)?;

        Ok(Self { root, blocks })
    }

    fn block(&self, index: BlockIndex) -> Result<&BlockHandle> {
        self.blocks.get(&index).ok_or(Error::BlockNotFound(index))
    }

    /// A reader over the contents of `file`. The checksum is verified at
    /// EOF.
    pub fn open_file(&self, file: &VpkFile) -> Result<FileReader> {
        Ok(file.create_reader(self.block(file.index)?))
    }

    /// Like [`VpkReader::open_file`], but decompresses up to `n` chunks
    /// ahead of the read position.
    pub fn open_file_parallel(&self, file: &VpkFile, n: usize) -> Result<FileReader> {
        Ok(file.create_reader_parallel(self.block(file.index)?, n))
    }

    /// A reader over one chunk's decompressed payload.
    pub fn open_chunk(&self, file: &VpkFile, chunk: &VpkChunk) -> Result<ChunkReader> {
        Ok(chunk.create_reader(self.block(file.index)?))
    }

    /// A reader over one chunk's raw bytes.
    pub fn open_chunk_raw(&self, file: &VpkFile, chunk: &VpkChunk) -> Result<SectionReader> {
        Ok(chunk.create_reader_raw(self.block(file.index)?))
    }

    /// The raw handle for a block.
    pub fn open_block_raw(&self, index: BlockIndex) -> Result<&BlockHandle> {
        self.block(index)
    }

    /// Filesystem-like access: open `name` as either an archived file or a
    /// directory listing synthesized from path prefixes. `"."` lists the
    /// root.
    pub fn open_path(&self, name: &str) -> Result<Entry> {
        let name = name.strip_prefix("./").unwrap_or(name);

        for file in &self.root.files {
            if file.path == name {
                return Ok(Entry::File(self.open_file(file)?));
            }
        }

        // Not a file: collect immediate children of the prefix.
        let mut children: BTreeMap<String, Option<&VpkFile>> = BTreeMap::new();
        if name == "." {
            for file in &self.root.files {
                match file.path.split_once('/') {
                    None => children.insert(file.path.clone(), Some(file)),
                    Some((head, _)) => children.insert(head.to_owned(), None),
                };
            }
        } else {
            let prefix = format!("{name}/");
            for file in &self.root.files {
                let Some(rest) = file.path.strip_prefix(&prefix) else {
                    continue;
                };
                match rest.split_once('/') {
                    None => children.insert(rest.to_owned(), Some(file)),
                    Some((head, _)) => children.insert(head.to_owned(), None),
                };
            }
            if children.is_empty() {
                return Err(Error::NotFound(name.to_owned()));
            }
        }

        Ok(Entry::Directory(
            children
                .into_iter()
                .map(|(name, file)| DirEntry {
                    name,
                    is_dir: file.is_none(),
                    size: file.map(VpkFile::uncompressed_size).unwrap_or(0),
                })
                .collect(),
        ))
    }
}

/// One entry resolved by [`VpkReader::open_path`].
pub enum Entry {
    File(FileReader),
    /// Immediate children, sorted by name.
    Directory(Vec<DirEntry>),
}

/// One name in a synthesized directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    /// Decompressed size for files, 0 for directories.
    pub size: u64,
}
