//! Tooling on top of the `revpk` codec: the `.vpkflags` and `.vpkignore`
//! rule languages, in-place directory editing, and the repack/optimize
//! engine with content-addressed chunk deduplication.

pub mod cancel;
pub mod edit;
pub mod error;
pub mod filter;
pub mod flags;
pub mod ignore;
pub mod optimize;

pub use cancel::CancelToken;
pub use edit::update_dir;
pub use error::{Result, UtilError};
pub use filter::IncludeExclude;
pub use flags::{FlagRule, VpkFlags, VPKFLAGS_FILENAME};
pub use ignore::{VpkIgnore, VPKIGNORE_FILENAME};
pub use optimize::{optimize, OptimizeOptions, OptimizeSummary};
