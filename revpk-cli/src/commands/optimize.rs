use std::fs;
use std::io;
use std::path::Path;

use revpk::{split_name, BlockIndex, VpkRef};
use revpk_util::OptimizeOptions;

use crate::commands::CliResult;
use crate::util::format_bytes_si;

pub fn handle(
    vpk_dir: &Path,
    names: &[String],
    output: &Path,
    prefix: &str,
    opts: OptimizeOptions,
) -> CliResult {
    match fs::create_dir(output) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }

    let names = if names.is_empty() {
        discover(vpk_dir, prefix)?
    } else {
        names.to_vec()
    };
    if names.is_empty() {
        return Err("no archives found in the input directory".into());
    }
    if opts.dry_run {
        println!("dry-run enabled, will not actually write output files");
    }

    for name in names {
        println!("optimizing {name}");
        let vpk = VpkRef::new(vpk_dir, prefix, name);
        let summary = revpk_util::optimize(&vpk, output, &opts)?;
        println!(
            "--- kept {} files (excluded {}), wrote {} chunks ({}; delta {})",
            summary.files_kept,
            summary.files_excluded,
            summary.chunks_written,
            format_bytes_si(summary.bytes_written as i64),
            format_bytes_si(summary.bytes_written as i64 - summary.source_bytes as i64),
        );
    }

    println!("done");
    Ok(())
}

/// All archive names in `dir`, identified by their `_dir.vpk` files.
fn discover(dir: &Path, prefix: &str) -> Result<Vec<String>, io::Error> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(file) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if let Ok((name, BlockIndex::DIR)) = split_name(&file, prefix) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
