use std::io;

use revpk::{VpkReader, VpkRef};

use crate::commands::CliResult;

pub fn handle(vpk: &VpkRef, threads: usize) -> CliResult {
    let reader = VpkReader::open(vpk)?;

    let mut failed = 0usize;
    for file in &reader.root.files {
        let result = reader
            .open_file_parallel(file, threads.max(1))
            .map_err(io::Error::other)
            .and_then(|mut r| io::copy(&mut r, &mut io::sink()));
        match result {
            Ok(_) => println!("ok      {}", file.path),
            Err(e) => {
                failed += 1;
                println!("failed  {}: {e}", file.path);
            }
        }
    }

    if failed != 0 {
        return Err(format!("{failed} file(s) failed verification").into());
    }
    Ok(())
}
