use std::fs;
use std::path::Path;

use revpk::{VpkReader, VpkRef};
use revpk_util::VpkFlags;

use crate::commands::CliResult;

pub fn generate(vpk: &VpkRef, explicit: bool, output: Option<&Path>) -> CliResult {
    let reader = VpkReader::open(vpk)?;

    let flags = if explicit {
        VpkFlags::generate_explicit(&reader.root)?
    } else {
        VpkFlags::generate(&reader.root)?
    };
    flags.test(&reader.root)?;

    match output {
        Some(path) => fs::write(path, flags.to_string())?,
        None => print!("{flags}"),
    }
    Ok(())
}

pub fn test(vpkflags: &Path, vpk: &VpkRef) -> CliResult {
    let flags = VpkFlags::parse_file(vpkflags)?;
    let reader = VpkReader::open(vpk)?;
    flags.test(&reader.root)?;
    println!("ok: {} rules reproduce all flags", flags.rules().len());
    Ok(())
}
