use std::fs;
use std::path::Path;

use revpk_util::{VpkFlags, VpkIgnore, VPKFLAGS_FILENAME, VPKIGNORE_FILENAME};

use crate::commands::CliResult;

use super::unpack::ensure_workdir;

pub fn handle(output: &Path) -> CliResult {
    println!("initializing new vpk in {:?}", output);

    let mut vpkignore = VpkIgnore::new();
    vpkignore.add_default();

    ensure_workdir(output, &vpkignore)?;

    fs::write(output.join(VPKFLAGS_FILENAME), VpkFlags::new().to_string())?;
    fs::write(output.join(VPKIGNORE_FILENAME), vpkignore.to_string())?;

    println!("done; add files and pack rules, then repack");
    Ok(())
}
