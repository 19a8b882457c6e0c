//! Chunk records and chunk payload readers.

use std::io::{self, Read, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use tracing::trace;

use crate::block::{BlockHandle, SectionReader};
use crate::codec;
use crate::error::{Error, Result};
use crate::MAX_CHUNK_UNCOMPRESSED_SIZE;

/// One chunk of a file's data inside a block. After deduplication a chunk
/// may be shared by several files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VpkChunk {
    /// Shared by all chunks of one file.
    pub load_flags: u32,
    /// Shared by all chunks of one file; only meaningful for `.vtf` files.
    pub texture_flags: u16,
    /// Byte offset inside the owning block.
    pub offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl VpkChunk {
    /// Whether the payload is compressed. Stored chunks have equal sizes.
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != self.uncompressed_size
    }

    /// Parse one chunk record.
    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self> {
        let load_flags = r.read_u32::<LittleEndian>()?;
        let texture_flags = r.read_u16::<LittleEndian>()?;
        let offset = r.read_u64::<LittleEndian>()?;
        let compressed_size = r.read_u64::<LittleEndian>()?;
        if compressed_size == 0 {
            return Err(Error::ZeroChunkSize("compressed"));
        }
        let uncompressed_size = r.read_u64::<LittleEndian>()?;
        if uncompressed_size == 0 {
            return Err(Error::ZeroChunkSize("uncompressed"));
        }
        Ok(Self {
            load_flags,
            texture_flags,
            offset,
            compressed_size,
            uncompressed_size,
        })
    }

    /// Write one chunk record.
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        if self.compressed_size == 0 {
            return Err(Error::ZeroChunkSize("compressed"));
        }
        if self.uncompressed_size == 0 {
            return Err(Error::ZeroChunkSize("uncompressed"));
        }
        w.write_u32::<LittleEndian>(self.load_flags)?;
        w.write_u16::<LittleEndian>(self.texture_flags)?;
        w.write_u64::<LittleEndian>(self.offset)?;
        w.write_u64::<LittleEndian>(self.compressed_size)?;
        w.write_u64::<LittleEndian>(self.uncompressed_size)?;
        Ok(())
    }

    /// A reader over the chunk's decompressed payload.
    pub fn create_reader(&self, block: &BlockHandle) -> ChunkReader {
        if self.is_compressed() {
            ChunkReader::Lazy(LazyChunkReader::new(
                block.clone(),
                self.offset,
                self.compressed_size,
                self.uncompressed_size,
            ))
        } else {
            ChunkReader::Stored(SectionReader::new(
                block.clone(),
                self.offset,
                self.compressed_size,
            ))
        }
    }

    /// A reader over the chunk's raw (possibly compressed) bytes.
    pub fn create_reader_raw(&self, block: &BlockHandle) -> SectionReader {
        SectionReader::new(block.clone(), self.offset, self.compressed_size)
    }

    pub(crate) fn check_uncompressed_size(&self) -> Result<()> {
        if self.uncompressed_size > MAX_CHUNK_UNCOMPRESSED_SIZE {
            return Err(Error::ChunkTooLarge {
                size: self.uncompressed_size,
                max: MAX_CHUNK_UNCOMPRESSED_SIZE,
            });
        }
        Ok(())
    }
}

/// A reader over one chunk's decompressed payload.
pub enum ChunkReader {
    /// Compressed chunk, decompressed in full on first read.
    Lazy(LazyChunkReader),
    /// Stored chunk, read straight from the block.
    Stored(SectionReader),
}

impl ChunkReader {
    /// The lazy half, when this chunk supports up-front decompression.
    pub fn lazy(&self) -> Option<&LazyChunkReader> {
        match self {
            ChunkReader::Lazy(r) => Some(r),
            ChunkReader::Stored(_) => None,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ChunkReader::Lazy(r) => r.read(buf),
            ChunkReader::Stored(r) => r.read(buf),
        }
    }
}

#[derive(Default)]
struct LazyState {
    buf: Option<Vec<u8>>,
    pos: usize,
    err: Option<String>,
}

struct LazyInner {
    block: BlockHandle,
    offset: u64,
    compressed_size: u64,
    uncompressed_size: u64,
    state: Mutex<LazyState>,
}

/// Decompresses a chunk on first use and then streams from the buffer.
///
/// Decompression is idempotent and serialized by a per-chunk mutex, so
/// look-ahead workers may call [`LazyChunkReader::ensure_decompressed`]
/// while the owning reader is mid-read. Errors are sticky.
#[derive(Clone)]
pub struct LazyChunkReader {
    inner: Arc<LazyInner>,
}

impl LazyChunkReader {
    pub fn new(block: BlockHandle, offset: u64, compressed_size: u64, uncompressed_size: u64) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                block,
                offset,
                compressed_size,
                uncompressed_size,
                state: Mutex::new(LazyState::default()),
            }),
        }
    }

    /// Synchronously decompress the payload if that has not happened yet.
    /// Does not advance the read position.
    pub fn ensure_decompressed(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        self.decompress_locked(&mut state)
            .map_err(|e| Error::Codec(e))
    }

    fn decompress_locked(&self, state: &mut LazyState) -> std::result::Result<(), String> {
        if let Some(err) = &state.err {
            return Err(err.clone());
        }
        if state.buf.is_some() {
            return Ok(());
        }

        let result = (|| -> Result<Vec<u8>> {
            let src = self
                .inner
                .block
                .slice(self.inner.offset, self.inner.compressed_size)?;
            let mut dst = vec![0u8; self.inner.uncompressed_size as usize];
            let decoded = codec::decompress(src, &mut dst)?;
            if decoded.written != dst.len() {
                return Err(Error::Codec(format!(
                    "decompressed {} bytes, expected {}",
                    decoded.written,
                    dst.len()
                )));
            }
            Ok(dst)
        })();

        match result {
            Ok(dst) => {
                trace!(
                    "decompressed chunk at {}: {} -> {} bytes",
                    self.inner.offset,
                    self.inner.compressed_size,
                    self.inner.uncompressed_size
                );
                state.buf = Some(dst);
                Ok(())
            }
            Err(e) => {
                let msg = match e {
                    Error::Codec(m) => m,
                    other => other.to_string(),
                };
                state.err = Some(msg.clone());
                Err(msg)
            }
        }
    }
}

impl Read for LazyChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.inner.state.lock();
        if let Err(msg) = self.decompress_locked(&mut state) {
            return Err(io::Error::other(msg));
        }
        let n = {
            let data = state.buf.as_deref().unwrap_or_default();
            if state.pos >= data.len() {
                return Ok(0);
            }
            let n = buf.len().min(data.len() - state.pos);
            buf[..n].copy_from_slice(&data[state.pos..state.pos + n]);
            n
        };
        state.pos += n;
        Ok(n)
    }
}
