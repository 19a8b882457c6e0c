//! In-place editing of a VPK directory file.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use tempfile::NamedTempFile;
use tracing::debug;

use revpk::{BlockIndex, VpkDir, VpkRef};

use crate::error::{Result, UtilError};

/// Open the archive's directory file, run `mutate` over the parsed
/// directory, and write the result back in place.
///
/// Chunk data stored after the tree in the `_dir.vpk` file is preserved:
/// when the mutation changes the tree size, the trailing bytes are parked in
/// a sibling temp file while the header and tree are rewritten, then
/// appended back. With `dry_run` the file is opened read-only and nothing is
/// written; the mutation still runs, so validation errors surface.
pub fn update_dir<F>(vpk: &VpkRef, dry_run: bool, mutate: F) -> Result<()>
where
    F: FnOnce(&mut VpkDir) -> Result<()>,
{
    let path = vpk.resolve(BlockIndex::DIR);
    let mut f = OpenOptions::new()
        .read(true)
        .write(!dry_run)
        .open(&path)?;

    let mut root = VpkDir::deserialize(&mut f)?;

    let orig_offset = root.chunk_offset()?;
    let pos = f.stream_position()?;
    if pos != orig_offset as u64 {
        return Err(UtilError::DirOffsetMismatch {
            expected: orig_offset,
            actual: pos,
        });
    }

    mutate(&mut root)?;

    let new_offset = root.chunk_offset()?;
    if dry_run {
        return Ok(());
    }

    if new_offset == orig_offset {
        // Same tree size: overwrite the header and tree, leaving the
        // trailing chunk data untouched.
        f.seek(SeekFrom::Start(0))?;
        let mut w = BufWriter::new(&mut f);
        root.serialize(&mut w)?;
        w.flush()?;
    } else {
        debug!(
            "dir tree resized {orig_offset} -> {new_offset}, shuffling trailing data via temp file"
        );
        let mut tmp = NamedTempFile::new_in(&vpk.path)?;
        io::copy(&mut f, tmp.as_file_mut())?;

        f.set_len(0)?;
        f.seek(SeekFrom::Start(0))?;
        let mut w = BufWriter::new(&mut f);
        root.serialize(&mut w)?;
        w.flush()?;
        drop(w);

        tmp.as_file_mut().seek(SeekFrom::Start(0))?;
        io::copy(tmp.as_file_mut(), &mut f)?;
    }

    f.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    use revpk::{crc32, VpkChunk, VpkFile, VpkReader};

    /// Write an archive whose files all live after the directory tree.
    fn write_dir_archive(dir: &std::path::Path) -> VpkRef {
        let vpk = VpkRef::new(dir, "english", "edit");
        let one = b"first payload";
        let two = b"second payload!";

        let mut root = VpkDir::default();
        let mut data = Vec::new();
        for (path, payload) in [("a/one.txt", &one[..]), ("b/two.txt", &two[..])] {
            root.files.push(VpkFile {
                path: path.into(),
                crc32: crc32(payload),
                preload_bytes: 0,
                index: BlockIndex::DIR,
                chunks: vec![VpkChunk {
                    load_flags: 0,
                    texture_flags: 0,
                    offset: data.len() as u64,
                    compressed_size: payload.len() as u64,
                    uncompressed_size: payload.len() as u64,
                }],
            });
            data.extend_from_slice(payload);
        }
        root.sort_files().unwrap();

        let mut bytes = Vec::new();
        root.serialize(&mut bytes).unwrap();
        bytes.extend_from_slice(&data);
        fs::write(vpk.resolve(BlockIndex::DIR), bytes).unwrap();
        vpk
    }

    fn trailing_bytes(vpk: &VpkRef) -> Vec<u8> {
        let bytes = fs::read(vpk.resolve(BlockIndex::DIR)).unwrap();
        let mut cursor = bytes.as_slice();
        let root = VpkDir::deserialize(&mut cursor).unwrap();
        bytes[root.chunk_offset().unwrap() as usize..].to_vec()
    }

    #[test]
    fn same_size_mutation_overwrites_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let vpk = write_dir_archive(tmp.path());
        let before = trailing_bytes(&vpk);

        update_dir(&vpk, false, |root| {
            for f in &mut root.files {
                // Same-length rename keeps the tree size unchanged.
                if f.path == "a/one.txt" {
                    f.path = "a/uno.txt".into();
                }
            }
            root.sort_files()?;
            Ok(())
        })
        .unwrap();

        assert_eq!(trailing_bytes(&vpk), before);
        let reader = VpkReader::open(&vpk).unwrap();
        assert!(reader.root.files.iter().any(|f| f.path == "a/uno.txt"));
    }

    #[test]
    fn resizing_mutation_preserves_trailing_data() {
        let tmp = tempfile::tempdir().unwrap();
        let vpk = write_dir_archive(tmp.path());
        let before = trailing_bytes(&vpk);

        update_dir(&vpk, false, |root| {
            for f in &mut root.files {
                if f.path == "b/two.txt" {
                    f.path = "b/two_renamed_longer.txt".into();
                }
            }
            root.sort_files()?;
            Ok(())
        })
        .unwrap();

        assert_eq!(trailing_bytes(&vpk), before);

        // The surviving files still read correctly through the new tree.
        let reader = VpkReader::open(&vpk).unwrap();
        let file = reader
            .root
            .files
            .iter()
            .find(|f| f.path == "b/two_renamed_longer.txt")
            .unwrap();
        let mut out = Vec::new();
        reader.open_file(file).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"second payload!");

        // No temp files left behind.
        let residue: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "englishedit_dir.vpk")
            .collect();
        assert!(residue.is_empty(), "{residue:?}");
    }

    #[test]
    fn dry_run_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let vpk = write_dir_archive(tmp.path());
        let before = fs::read(vpk.resolve(BlockIndex::DIR)).unwrap();

        update_dir(&vpk, true, |root| {
            root.files.clear();
            Ok(())
        })
        .unwrap();

        assert_eq!(fs::read(vpk.resolve(BlockIndex::DIR)).unwrap(), before);
    }

    #[test]
    fn mutation_error_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let vpk = write_dir_archive(tmp.path());
        let before = fs::read(vpk.resolve(BlockIndex::DIR)).unwrap();

        let result = update_dir(&vpk, false, |_| Err(UtilError::Cancelled));
        assert!(matches!(result, Err(UtilError::Cancelled)));
        assert_eq!(fs::read(vpk.resolve(BlockIndex::DIR)).unwrap(), before);
    }
}
