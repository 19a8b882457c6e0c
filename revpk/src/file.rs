//! File records and whole-file readers.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::block::BlockHandle;
use crate::chunk::{ChunkReader, VpkChunk};
use crate::crc::CrcReader;
use crate::error::{Error, Result};
use crate::BlockIndex;

/// A file entry in a VPK directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpkFile {
    /// Forward-slash path inside the archive, e.g. `scripts/weapons/a.txt`.
    pub path: String,
    /// Checksum of the decompressed file contents; 0 disables verification.
    pub crc32: u32,
    /// Always 0; non-zero preload data is unsupported.
    pub preload_bytes: u16,
    /// Block holding this file's chunks.
    pub index: BlockIndex,
    /// At least one chunk.
    pub chunks: Vec<VpkChunk>,
}

impl VpkFile {
    /// The load flags shared by every chunk of this file.
    pub fn load_flags(&self) -> Result<u32> {
        let first = self
            .chunks
            .first()
            .ok_or_else(|| Error::NoChunks(self.path.clone()))?;
        if self.chunks.iter().any(|c| c.load_flags != first.load_flags) {
            return Err(Error::MismatchedLoadFlags(self.path.clone()));
        }
        Ok(first.load_flags)
    }

    /// The texture flags shared by every chunk of this file.
    pub fn texture_flags(&self) -> Result<u16> {
        let first = self
            .chunks
            .first()
            .ok_or_else(|| Error::NoChunks(self.path.clone()))?;
        if self
            .chunks
            .iter()
            .any(|c| c.texture_flags != first.texture_flags)
        {
            return Err(Error::MismatchedTextureFlags(self.path.clone()));
        }
        Ok(first.texture_flags)
    }

    /// Total decompressed size.
    pub fn uncompressed_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.uncompressed_size).sum()
    }

    /// Parse a file record (everything after the tree's base-name string).
    pub fn deserialize<R: Read>(r: &mut R, path: String) -> Result<Self> {
        let crc32 = r.read_u32::<LittleEndian>()?;
        let preload_bytes = r.read_u16::<LittleEndian>()?;
        if preload_bytes != 0 {
            return Err(Error::PreloadNotSupported(preload_bytes as u32));
        }
        let index = BlockIndex(r.read_u16::<LittleEndian>()?);

        let mut chunks: Vec<VpkChunk> = Vec::new();
        loop {
            let chunk = VpkChunk::deserialize(r)?;
            // Observed invariants: flags agree across the file's chunks and
            // payloads stay within the format's chunk size limit.
            if let Some(first) = chunks.first() {
                if chunk.load_flags != first.load_flags {
                    return Err(Error::MismatchedLoadFlags(path));
                }
                if chunk.texture_flags != first.texture_flags {
                    return Err(Error::MismatchedTextureFlags(path));
                }
            }
            chunk.check_uncompressed_size()?;
            chunks.push(chunk);

            let terminator = r.read_u16::<LittleEndian>()?;
            if BlockIndex(terminator) == BlockIndex::EOF {
                break;
            }
            if terminator != index.0 {
                return Err(Error::BadChunkTerminator { index, terminator });
            }
        }

        Ok(Self {
            path,
            crc32,
            preload_bytes,
            index,
            chunks,
        })
    }

    /// Write a file record.
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.crc32)?;
        if self.preload_bytes != 0 {
            return Err(Error::PreloadNotSupported(self.preload_bytes as u32));
        }
        w.write_u16::<LittleEndian>(self.preload_bytes)?;
        w.write_u16::<LittleEndian>(self.index.0)?;

        let first = self
            .chunks
            .first()
            .ok_or_else(|| Error::NoChunks(self.path.clone()))?;
        for (i, chunk) in self.chunks.iter().enumerate() {
            if !self.path.is_empty() && chunk.texture_flags != 0 && !self.path.ends_with(".vtf") {
                return Err(Error::TextureFlagsOutsideVtf(self.path.clone()));
            }
            if chunk.load_flags != first.load_flags {
                return Err(Error::MismatchedLoadFlags(self.path.clone()));
            }
            if chunk.texture_flags != first.texture_flags {
                return Err(Error::MismatchedTextureFlags(self.path.clone()));
            }
            chunk.check_uncompressed_size()?;

            if i != 0 {
                w.write_u16::<LittleEndian>(self.index.0)?;
            }
            chunk.serialize(w)?;
        }
        w.write_u16::<LittleEndian>(BlockIndex::EOF.0)?;
        Ok(())
    }

    /// A verifying reader over the whole file's contents.
    pub fn create_reader(&self, block: &BlockHandle) -> FileReader {
        self.create_reader_parallel(block, 1)
    }

    /// Like [`VpkFile::create_reader`], but decompresses up to `n` chunks
    /// ahead of the read position on the global worker pool (1 is not
    /// parallel).
    pub fn create_reader_parallel(&self, block: &BlockHandle, n: usize) -> FileReader {
        let readers: VecDeque<ChunkReader> =
            self.chunks.iter().map(|c| c.create_reader(block)).collect();
        CrcReader::new(
            MultiChunkReader::new(readers, n.saturating_sub(1)),
            self.uncompressed_size(),
            self.crc32,
        )
    }
}

/// A reader over a whole file, with length and checksum verification at EOF.
pub type FileReader = CrcReader<MultiChunkReader>;

/// Drains a sequence of chunk readers in order. Each time a chunk is
/// finished, decompression of up to `look_ahead` upcoming compressed chunks
/// is kicked off in the background; the warm-up never advances the public
/// read position, so output order is always chunk-list order.
pub struct MultiChunkReader {
    readers: VecDeque<ChunkReader>,
    look_ahead: usize,
}

impl MultiChunkReader {
    pub fn new(readers: VecDeque<ChunkReader>, look_ahead: usize) -> Self {
        Self {
            readers,
            look_ahead,
        }
    }

    fn spawn_look_ahead(&self) {
        let mut remaining = self.look_ahead;
        if remaining == 0 {
            return;
        }
        for reader in &self.readers {
            if let Some(lazy) = reader.lazy() {
                let handle = lazy.clone();
                rayon::spawn(move || {
                    // Results are picked up when the main reader gets here;
                    // a failure will resurface from the sticky state.
                    let _ = handle.ensure_decompressed();
                });
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
        }
    }
}

impl Read for MultiChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while let Some(front) = self.readers.front_mut() {
            let n = front.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            if buf.is_empty() {
                return Ok(0);
            }
            self.readers.pop_front();
            self.spawn_look_ahead();
        }
        Ok(0)
    }
}
