use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use revpk::{Error, VpkReader, VpkRef};

use crate::commands::CliResult;

pub fn handle(vpk: &VpkRef, file: &str, output: Option<&Path>) -> CliResult {
    let reader = VpkReader::open(vpk)?;
    let name = file.strip_prefix("./").unwrap_or(file);

    let entry = reader
        .root
        .files
        .iter()
        .find(|f| f.path == name)
        .ok_or_else(|| Error::NotFound(name.to_owned()))?;
    let mut src = reader.open_file(entry)?;

    match output {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            io::copy(&mut src, &mut out)?;
            out.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            io::copy(&mut src, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}
