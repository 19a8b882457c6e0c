use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::info;

use revpk::{VpkReader, VpkRef};
use revpk_util::{IncludeExclude, VpkFlags, VpkIgnore, VPKFLAGS_FILENAME, VPKIGNORE_FILENAME};

use crate::commands::CliResult;

pub struct Options {
    pub vpkflags_explicit: bool,
    pub vpkignore_no_default: bool,
    pub threads: usize,
    pub filter: IncludeExclude,
}

pub fn handle(vpk: &VpkRef, output: &Path, opts: Options) -> CliResult {
    let reader = VpkReader::open(vpk)?;

    println!("unpacking vpk to {:?}", output);

    println!("... generating {VPKFLAGS_FILENAME}");
    let vpkflags = if opts.vpkflags_explicit {
        VpkFlags::generate_explicit(&reader.root)?
    } else {
        VpkFlags::generate(&reader.root)?
    };
    // A generated rule set that does not reproduce the archive is a bug,
    // not a user error.
    vpkflags.test(&reader.root)?;

    println!("... generating {VPKIGNORE_FILENAME}");
    let mut vpkignore = VpkIgnore::new();
    if !opts.vpkignore_no_default {
        vpkignore.add_default();
    }
    vpkignore.add_auto_exclusions(&reader.root)?;

    println!("... creating output directory");
    ensure_workdir(output, &vpkignore)?;

    fs::write(output.join(VPKFLAGS_FILENAME), vpkflags.to_string())?;
    fs::write(output.join(VPKIGNORE_FILENAME), vpkignore.to_string())?;

    println!("... extracting {} files", reader.root.files.len());
    let mut skipped = 0usize;
    for file in &reader.root.files {
        if opts.filter.skip(&file.path)? {
            skipped += 1;
            continue;
        }
        let dest = output.join(&file.path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        info!("extracting {}", file.path);
        let mut src = reader.open_file_parallel(file, opts.threads.max(1))?;
        let mut out = BufWriter::new(fs::File::create(&dest)?);
        io::copy(&mut src, &mut out)?;
        out.flush()?;
    }
    if skipped != 0 {
        println!("... skipped {skipped} excluded files");
    }

    println!("done");
    Ok(())
}

/// Create `dir` if needed and require it to be empty apart from entries the
/// ignore rules would drop anyway.
pub fn ensure_workdir(dir: &Path, ignore: &VpkIgnore) -> CliResult {
    match fs::create_dir(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if !ignore.matches(&name) {
            return Err(format!(
                "output directory must not exist or be empty (other than ignored files), found {name:?}"
            )
            .into());
        }
    }
    Ok(())
}
