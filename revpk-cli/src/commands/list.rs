use revpk::{describe_load_flags, describe_texture_flags, VpkReader, VpkRef};

use crate::commands::CliResult;
use crate::util::format_bytes_si;

pub fn handle(vpk: &VpkRef, long: bool) -> CliResult {
    let reader = VpkReader::open(vpk)?;

    for file in &reader.root.files {
        let size = file.uncompressed_size();
        let stored: u64 = file.chunks.iter().map(|c| c.compressed_size).sum();
        println!(
            "{:>10} {:>6.1}% {}",
            format_bytes_si(size as i64),
            100.0 * stored as f64 / size.max(1) as f64,
            file.path
        );

        if long {
            let load = file.load_flags()?;
            let texture = file.texture_flags()?;
            println!(
                "           crc32={:08X} block={} load=[{}] texture=[{}]",
                file.crc32,
                file.index,
                describe_load_flags(load).join(" "),
                describe_texture_flags(texture).join(" "),
            );
            for (i, chunk) in file.chunks.iter().enumerate() {
                println!(
                    "           chunk {i}: offset={} csz={} usz={}{}",
                    chunk.offset,
                    chunk.compressed_size,
                    chunk.uncompressed_size,
                    if chunk.is_compressed() { "" } else { " (stored)" },
                );
            }
        }
    }
    Ok(())
}
