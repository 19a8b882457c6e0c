//! End-to-end repack tests.

use std::fs;
use std::io::Read;
use std::path::Path;

use revpk::{codec, crc32, BlockIndex, VpkChunk, VpkDir, VpkFile, VpkReader, VpkRef};
use revpk_util::{optimize, CancelToken, IncludeExclude, OptimizeOptions, UtilError};

struct Fixture {
    vpk: VpkRef,
    contents: Vec<(String, Vec<u8>)>,
}

/// Build a two-block archive where `shared` appears as the only chunk of
/// two different files in two different blocks, plus one compressed file.
fn build_fixture(dir: &Path) -> Fixture {
    let vpk = VpkRef::new(dir, "english", "pak");
    let shared = b"identical chunk payload, stored".to_vec();
    let unique = b"unique payload ".repeat(1024);

    let mut files = Vec::new();
    let mut blocks: std::collections::HashMap<BlockIndex, Vec<u8>> = Default::default();

    let mut add_stored = |path: &str, index: BlockIndex, payload: &[u8]| {
        let block = blocks.entry(index).or_default();
        // Leading junk so identical payloads land at different offsets.
        block.extend_from_slice(&[0xAB; 7][..(block.len() % 7)]);
        let offset = block.len() as u64;
        block.extend_from_slice(payload);
        files.push(VpkFile {
            path: path.into(),
            crc32: crc32(payload),
            preload_bytes: 0,
            index,
            chunks: vec![VpkChunk {
                load_flags: 0x101,
                texture_flags: 0,
                offset,
                compressed_size: payload.len() as u64,
                uncompressed_size: payload.len() as u64,
            }],
        });
    };
    add_stored("a/first.txt", BlockIndex(0), &shared);
    add_stored("b/second.txt", BlockIndex(1), &shared);
    add_stored("b/third.txt", BlockIndex(1), &shared);
    drop(add_stored);

    let packed = codec::compress(&unique).unwrap();
    let block = blocks.entry(BlockIndex(0)).or_default();
    let offset = block.len() as u64;
    block.extend_from_slice(&packed);
    files.push(VpkFile {
        path: "models/unique.mdl".into(),
        crc32: crc32(&unique),
        preload_bytes: 0,
        index: BlockIndex(0),
        chunks: vec![VpkChunk {
            load_flags: 0,
            texture_flags: 0,
            offset,
            compressed_size: packed.len() as u64,
            uncompressed_size: unique.len() as u64,
        }],
    });

    let mut root = VpkDir {
        files,
        ..VpkDir::default()
    };
    root.sort_files().unwrap();
    let mut dir_bytes = Vec::new();
    root.serialize(&mut dir_bytes).unwrap();
    fs::write(vpk.resolve(BlockIndex::DIR), dir_bytes).unwrap();
    for (index, data) in &blocks {
        fs::write(vpk.resolve(*index), data).unwrap();
    }

    Fixture {
        vpk,
        contents: vec![
            ("a/first.txt".into(), shared.clone()),
            ("b/second.txt".into(), shared.clone()),
            ("b/third.txt".into(), shared),
            ("models/unique.mdl".into(), unique),
        ],
    }
}

fn read_all(vpk: &VpkRef) -> Vec<(String, Vec<u8>)> {
    let reader = VpkReader::open(vpk).unwrap();
    let mut out = Vec::new();
    for file in &reader.root.files {
        let mut bytes = Vec::new();
        reader
            .open_file(file)
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        out.push((file.path.clone(), bytes));
    }
    out.sort();
    out
}

#[test]
fn accept_all_repack_preserves_contents_and_dedups() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let fixture = build_fixture(input.path());

    let summary = optimize(&fixture.vpk, output.path(), &OptimizeOptions::default()).unwrap();
    assert_eq!(summary.files_kept, 4);
    assert_eq!(summary.files_excluded, 0);
    // The duplicate payload in block 1 collapses to one physical chunk.
    assert_eq!(summary.chunks_written, 3);

    let out_vpk = VpkRef::new(output.path(), "english", "pak");
    let mut expected = fixture.contents.clone();
    expected.sort();
    assert_eq!(read_all(&out_vpk), expected);

    // Dedup within block 1: its size is exactly one shared payload.
    let block1 = fs::metadata(out_vpk.resolve(BlockIndex(1))).unwrap().len();
    assert_eq!(block1, fixture.contents[1].1.len() as u64);

    // Both block-1 files point at the same physical chunk.
    let reader = VpkReader::open(&out_vpk).unwrap();
    let offsets: Vec<u64> = reader
        .root
        .files
        .iter()
        .filter(|f| f.index == BlockIndex(1))
        .map(|f| f.chunks[0].offset)
        .collect();
    assert_eq!(offsets, vec![0, 0]);
}

#[test]
fn merge_collapses_to_block_zero() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let fixture = build_fixture(input.path());

    let opts = OptimizeOptions {
        merge: true,
        ..Default::default()
    };
    let summary = optimize(&fixture.vpk, output.path(), &opts).unwrap();
    // Merging dedups the shared payload across the former blocks too.
    assert_eq!(summary.chunks_written, 2);

    let out_vpk = VpkRef::new(output.path(), "english", "pak");
    assert!(out_vpk.resolve(BlockIndex(0)).exists());
    assert!(!out_vpk.resolve(BlockIndex(1)).exists());

    let reader = VpkReader::open(&out_vpk).unwrap();
    assert!(reader.root.files.iter().all(|f| f.index == BlockIndex(0)));

    let mut expected = fixture.contents.clone();
    expected.sort();
    assert_eq!(read_all(&out_vpk), expected);
}

#[test]
fn filter_drops_files() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let fixture = build_fixture(input.path());

    let opts = OptimizeOptions {
        filter: IncludeExclude {
            exclude: vec!["b".into()],
            include: vec!["second.txt".into()],
            ..Default::default()
        },
        ..Default::default()
    };
    let summary = optimize(&fixture.vpk, output.path(), &opts).unwrap();
    assert_eq!(summary.files_excluded, 1);

    let out_vpk = VpkRef::new(output.path(), "english", "pak");
    let reader = VpkReader::open(&out_vpk).unwrap();
    let paths: Vec<&str> = reader.root.files.iter().map(|f| f.path.as_str()).collect();
    assert!(paths.contains(&"b/second.txt"));
    assert!(!paths.contains(&"b/third.txt"));
}

#[test]
fn dry_run_writes_nothing() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let fixture = build_fixture(input.path());

    let opts = OptimizeOptions {
        dry_run: true,
        ..Default::default()
    };
    let summary = optimize(&fixture.vpk, output.path(), &opts).unwrap();
    assert_eq!(summary.chunks_written, 3);
    assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
}

#[test]
fn same_directory_is_rejected() {
    let input = tempfile::tempdir().unwrap();
    let fixture = build_fixture(input.path());
    assert!(matches!(
        optimize(&fixture.vpk, input.path(), &OptimizeOptions::default()),
        Err(UtilError::SameDirectory { .. })
    ));
}

#[test]
fn cancellation_aborts_and_cleans_up() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let fixture = build_fixture(input.path());

    let cancel = CancelToken::new();
    cancel.cancel();
    let opts = OptimizeOptions {
        cancel,
        ..Default::default()
    };
    assert!(matches!(
        optimize(&fixture.vpk, output.path(), &opts),
        Err(UtilError::Cancelled)
    ));
    assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
}
