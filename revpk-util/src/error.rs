//! Error types for VPK tooling.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for VPK tooling operations.
pub type Result<T> = std::result::Result<T, UtilError>;

/// Errors from rule engines, the dir editor, and the repack engine.
#[derive(Error, Debug)]
pub enum UtilError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from the archive codec.
    #[error(transparent)]
    Vpk(#[from] revpk::Error),

    /// Cooperative cancellation was delivered.
    #[error("operation cancelled")]
    Cancelled,

    /// The repack output directory equals the input directory.
    #[error("output directory {path:?} must differ from the input directory")]
    SameDirectory { path: PathBuf },

    /// A repacked file would have its chunks written into the DIR block,
    /// which the engine does not support.
    #[error("file {0:?}: writing chunks into the dir block is not supported")]
    DirBlockTarget(String),

    /// After parsing, the dir file cursor was not at the computed chunk
    /// offset. This is a bug in the codec, not in the input.
    #[error("dir cursor at {actual} after parse, expected chunk offset {expected} (codec bug)")]
    DirOffsetMismatch { expected: u32, actual: u64 },

    /// A rule file line could not be parsed.
    #[error("line {line}: {reason}")]
    RuleSyntax { line: usize, reason: String },

    /// A glob was rejected when adding a rule.
    #[error("glob {glob:?}: {reason}")]
    InvalidGlob { glob: String, reason: String },

    /// A path cannot be used as a literal rule glob.
    #[error("path {path:?} cannot be used in a rule: {reason}")]
    InvalidRulePath { path: String, reason: String },

    /// Matching a pattern against a path failed.
    #[error("match {path:?} against glob {pattern:?}: {source}")]
    GlobMatch {
        pattern: String,
        path: String,
        #[source]
        source: revpk::Error,
    },

    /// A `.vpkflags` rule set disagrees with an archive's actual flags.
    #[error("entry {path:?}: {detail}")]
    FlagMismatch { path: String, detail: String },

    /// Publishing a temp file to its final name failed.
    #[error("persist temp file: {0}")]
    Persist(#[from] tempfile::PersistError),
}
