//! Random-access block data.
//!
//! A [`BlockHandle`] is a cheaply clonable, read-only view of one block
//! file's bytes, shared by every chunk reader cut from it. On disk it is
//! memory-mapped; tests and programmatic callers can supply owned bytes.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::debug;

use crate::error::{Error, Result};

enum BlockData {
    Mapped(Mmap),
    Memory(Vec<u8>),
}

impl BlockData {
    fn bytes(&self) -> &[u8] {
        match self {
            BlockData::Mapped(m) => m,
            BlockData::Memory(v) => v,
        }
    }
}

/// Shared read-only access to a block's bytes, optionally starting at a
/// fixed base offset within the underlying data.
#[derive(Clone)]
pub struct BlockHandle {
    data: Arc<BlockData>,
    base: u64,
}

impl BlockHandle {
    /// Open and memory-map a block file. Unmappable files (notably empty
    /// ones) are read into memory instead.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        debug!("opening block {:?} ({size} bytes)", path);

        let data = if size > 0 {
            match unsafe { Mmap::map(&file) } {
                Ok(map) => BlockData::Mapped(map),
                Err(e) => {
                    debug!("mmap failed for {:?}, reading into memory: {e}", path);
                    let mut buf = Vec::with_capacity(size as usize);
                    (&file).read_to_end(&mut buf)?;
                    BlockData::Memory(buf)
                }
            }
        } else {
            BlockData::Memory(Vec::new())
        };

        Ok(Self {
            data: Arc::new(data),
            base: 0,
        })
    }

    /// A block over owned bytes.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(BlockData::Memory(data)),
            base: 0,
        }
    }

    /// A view of the same data starting `base` bytes in. Offsets passed to
    /// [`BlockHandle::slice`] and [`BlockHandle::read_at`] are relative to
    /// the new base.
    pub fn with_base(&self, base: u64) -> Self {
        Self {
            data: Arc::clone(&self.data),
            base: self.base + base,
        }
    }

    /// Length of the viewed region.
    pub fn len(&self) -> u64 {
        (self.data.bytes().len() as u64).saturating_sub(self.base)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A bounds-checked sub-slice of the viewed region.
    pub fn slice(&self, offset: u64, length: u64) -> Result<&[u8]> {
        if offset.checked_add(length).is_none_or(|end| end > self.len()) {
            return Err(Error::OutOfBounds {
                offset,
                length,
                size: self.len(),
            });
        }
        let start = (self.base + offset) as usize;
        Ok(&self.data.bytes()[start..start + length as usize])
    }

    /// Copy up to `buf.len()` bytes starting at `offset`. Returns 0 at or
    /// past the end of the region.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let len = self.len();
        if offset >= len {
            return Ok(0);
        }
        let avail = (len - offset) as usize;
        let n = buf.len().min(avail);
        let start = (self.base + offset) as usize;
        buf[..n].copy_from_slice(&self.data.bytes()[start..start + n]);
        Ok(n)
    }
}

/// A [`Read`] view over a fixed region of a block.
pub struct SectionReader {
    block: BlockHandle,
    pos: u64,
    end: u64,
}

impl SectionReader {
    /// A reader over `length` bytes starting at `offset`. The region may
    /// extend past the block's end; reads simply stop early there.
    pub fn new(block: BlockHandle, offset: u64, length: u64) -> Self {
        Self {
            block,
            pos: offset,
            end: offset.saturating_add(length),
        }
    }
}

impl Read for SectionReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.end {
            return Ok(0);
        }
        let want = buf.len().min((self.end - self.pos) as usize);
        let n = self.block.read_at(&mut buf[..want], self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}
