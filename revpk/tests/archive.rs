//! End-to-end archive tests against real files on disk.

use std::fs;
use std::io::Read;

use revpk::{
    codec, crc32, BlockIndex, Entry, VpkChunk, VpkDir, VpkFile, VpkReader, VpkRef,
};

/// Write a small two-block archive into `dir` and return its reference plus
/// the expected file contents.
fn write_archive(dir: &std::path::Path) -> (VpkRef, Vec<(String, Vec<u8>)>) {
    let vpk = VpkRef::new(dir, "english", "testpak");

    let small = b"small stored payload".to_vec();
    let big = b"compressible payload ".repeat(2048);
    let embedded = b"lives after the tree".to_vec();

    // Block 0: one stored chunk, then two compressed chunks of one file.
    let mut block0 = Vec::new();
    let mut files = Vec::new();

    let offset = block0.len() as u64;
    block0.extend_from_slice(&small);
    files.push(VpkFile {
        path: "cfg/small.txt".into(),
        crc32: crc32(&small),
        preload_bytes: 0,
        index: BlockIndex(0),
        chunks: vec![VpkChunk {
            load_flags: 0x101,
            texture_flags: 0,
            offset,
            compressed_size: small.len() as u64,
            uncompressed_size: small.len() as u64,
        }],
    });

    let (first, second) = big.split_at(big.len() / 2);
    let mut chunks = Vec::new();
    for part in [first, second] {
        let packed = codec::compress(part).unwrap();
        chunks.push(VpkChunk {
            load_flags: 0,
            texture_flags: 0,
            offset: block0.len() as u64,
            compressed_size: packed.len() as u64,
            uncompressed_size: part.len() as u64,
        });
        block0.extend_from_slice(&packed);
    }
    files.push(VpkFile {
        path: "models/big.mdl".into(),
        crc32: crc32(&big),
        preload_bytes: 0,
        index: BlockIndex(0),
        chunks,
    });

    // One file embedded after the directory tree.
    files.push(VpkFile {
        path: "embedded.txt".into(),
        crc32: crc32(&embedded),
        preload_bytes: 0,
        index: BlockIndex::DIR,
        chunks: vec![VpkChunk {
            load_flags: 0,
            texture_flags: 0,
            offset: 0,
            compressed_size: embedded.len() as u64,
            uncompressed_size: embedded.len() as u64,
        }],
    });

    let mut root = VpkDir {
        files,
        ..VpkDir::default()
    };
    root.sort_files().unwrap();

    let mut dir_bytes = Vec::new();
    root.serialize(&mut dir_bytes).unwrap();
    dir_bytes.extend_from_slice(&embedded);

    fs::write(vpk.resolve(BlockIndex::DIR), dir_bytes).unwrap();
    fs::write(vpk.resolve(BlockIndex(0)), block0).unwrap();

    let expected = vec![
        ("cfg/small.txt".to_owned(), small),
        ("models/big.mdl".to_owned(), big),
        ("embedded.txt".to_owned(), embedded),
    ];
    (vpk, expected)
}

#[test]
fn open_and_read_all_files() {
    let tmp = tempfile::tempdir().unwrap();
    let (vpk, expected) = write_archive(tmp.path());

    let reader = VpkReader::open(&vpk).unwrap();
    assert_eq!(reader.root.files.len(), expected.len());

    for (path, contents) in &expected {
        let file = reader
            .root
            .files
            .iter()
            .find(|f| &f.path == path)
            .expect("file present in directory");
        let mut out = Vec::new();
        reader
            .open_file_parallel(file, 4)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(&out, contents, "{path}");
    }
}

#[test]
fn filesystem_view_over_disk_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let (vpk, _) = write_archive(tmp.path());
    let reader = VpkReader::open(&vpk).unwrap();

    let Entry::Directory(entries) = reader.open_path(".").unwrap() else {
        panic!("expected a directory listing");
    };
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["cfg", "embedded.txt", "models"]);

    let Entry::File(mut f) = reader.open_path("embedded.txt").unwrap() else {
        panic!("expected a file");
    };
    let mut out = String::new();
    f.read_to_string(&mut out).unwrap();
    assert_eq!(out, "lives after the tree");
}

#[test]
fn corrupted_block_fails_crc() {
    let tmp = tempfile::tempdir().unwrap();
    let (vpk, _) = write_archive(tmp.path());

    // Flip a byte inside the stored chunk of block 0.
    let path = vpk.resolve(BlockIndex(0));
    let mut bytes = fs::read(&path).unwrap();
    bytes[2] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let reader = VpkReader::open(&vpk).unwrap();
    let file = reader
        .root
        .files
        .iter()
        .find(|f| f.path == "cfg/small.txt")
        .unwrap();
    let mut out = Vec::new();
    let err = reader
        .open_file(file)
        .unwrap()
        .read_to_end(&mut out)
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn delete_removes_family_members() {
    let tmp = tempfile::tempdir().unwrap();
    let (vpk, _) = write_archive(tmp.path());
    // An unrelated file must survive.
    fs::write(tmp.path().join("keep.txt"), b"keep").unwrap();

    vpk.delete().unwrap();
    assert!(!vpk.resolve(BlockIndex::DIR).exists());
    assert!(!vpk.resolve(BlockIndex(0)).exists());
    assert!(tmp.path().join("keep.txt").exists());
}
