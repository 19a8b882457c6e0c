//! Error types for VPK parsing, reading, and writing.

use std::io;

use thiserror::Error;

use crate::BlockIndex;

/// Result type for VPK operations.
pub type Result<T> = std::result::Result<T, Error>;

/// VPK error types.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid directory magic.
    #[error("invalid dir magic: expected {expected:08X}, got {actual:08X}")]
    InvalidMagic { expected: u32, actual: u32 },

    /// Unsupported directory version.
    #[error("unsupported dir version {major}.{minor} (expected {}.{})", crate::VPK_VERSION_MAJOR, crate::VPK_VERSION_MINOR)]
    UnsupportedVersion { major: u16, minor: u16 },

    /// Non-zero preload data, which this implementation does not support.
    #[error("preload bytes are not supported (data size {0})")]
    PreloadNotSupported(u32),

    /// The tree ended earlier or later than its declared size.
    #[error("directory tree size mismatch: declared {declared}, consumed {consumed}")]
    TreeSizeMismatch { declared: u32, consumed: u32 },

    /// Re-serializing a freshly parsed tree produced a different size.
    /// This is a bug in the codec, not in the input.
    #[error("re-serialized tree size mismatch: declared {declared}, got {actual} (codec bug)")]
    ReserializeMismatch { declared: u32, actual: u32 },

    /// A file path without an extension cannot be placed in the tree.
    #[error("no extension for file {0:?}")]
    MissingExtension(String),

    /// A tree string was not valid UTF-8.
    #[error("directory tree {0} is not valid UTF-8")]
    InvalidString(&'static str),

    /// Tree emission revisited an already closed branch.
    #[error("tree branch {0:?} reopened: files are not sorted")]
    UnsortedTree(String),

    /// A non-EOF chunk terminator did not match the file's block index.
    #[error("chunk terminator {terminator:#06X} does not equal block index {index}")]
    BadChunkTerminator { index: BlockIndex, terminator: u16 },

    /// A file has no chunks.
    #[error("file {0:?} has no chunks")]
    NoChunks(String),

    /// Chunks of one file carry differing load flags.
    #[error("file {0:?}: load flags differ between chunks")]
    MismatchedLoadFlags(String),

    /// Chunks of one file carry differing texture flags.
    #[error("file {0:?}: texture flags differ between chunks")]
    MismatchedTextureFlags(String),

    /// Texture flags on a file that is not a `.vtf`.
    #[error("file {0:?}: texture flags set on a non-vtf file")]
    TextureFlagsOutsideVtf(String),

    /// A chunk size field was zero.
    #[error("chunk {0} size must be non-zero")]
    ZeroChunkSize(&'static str),

    /// A chunk's uncompressed size exceeds the format limit.
    #[error("chunk uncompressed size {size} larger than {max}")]
    ChunkTooLarge { size: u64, max: u64 },

    /// CRC32 mismatch at end of file.
    #[error("crc mismatch: expected {expected:08X}, got {actual:08X}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Fewer bytes than declared were produced.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    /// Chunk payload decompression failed.
    #[error("codec: {0}")]
    Codec(String),

    /// Read beyond the bounds of a block.
    #[error("read beyond block bounds: offset={offset}, length={length}, size={size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    /// A chunk referenced a block the reader does not have.
    #[error("block {0} out of range")]
    BlockNotFound(BlockIndex),

    /// Opening a referenced block file failed.
    #[error("open vpk block {index}: {source}")]
    BlockOpen {
        index: BlockIndex,
        #[source]
        source: Box<Error>,
    },

    /// Several independent failures.
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<Error>),

    /// A filename could not be split into an archive name and block index.
    #[error("split {filename:?} (prefix {prefix:?}): {reason}")]
    InvalidName {
        filename: String,
        prefix: String,
        reason: String,
    },

    /// No such file or directory in the archive.
    #[error("no entry {0:?} in archive")]
    NotFound(String),

    /// Malformed glob pattern.
    #[error("invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),
}

impl Error {
    /// Collapse a list of errors into one, if any.
    pub(crate) fn join(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }
}
