//! The VPK directory: header plus the grouped ext/path/name tree.

use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::file::VpkFile;
use crate::{VPK_MAGIC, VPK_VERSION_MAJOR, VPK_VERSION_MINOR};

/// The root directory of a VPK, providing byte-for-byte identical
/// serialization and deserialization. Invalid structures are refused on both
/// the read and the write path.
///
/// The tree size is not stored; it is recomputed on every write and checked
/// against the declared value on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpkDir {
    pub magic: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// Preload data size. Must be 0.
    pub data_size: u32,
    /// File entries. Order only matters for tree emission, which requires
    /// (ext, path, base) ascending; see [`VpkDir::sort_files`].
    pub files: Vec<VpkFile>,
}

impl Default for VpkDir {
    fn default() -> Self {
        Self {
            magic: VPK_MAGIC,
            major_version: VPK_VERSION_MAJOR,
            minor_version: VPK_VERSION_MINOR,
            data_size: 0,
            files: Vec::new(),
        }
    }
}

impl VpkDir {
    /// Size of the fixed directory header.
    pub const HEADER_SIZE: u32 = 16;

    /// Parse a directory from the start of `r`. Exactly
    /// `HEADER_SIZE + tree_size` bytes are consumed, leaving `r` positioned
    /// at the start of any trailing DIR-block chunk data.
    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self> {
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != VPK_MAGIC {
            return Err(Error::InvalidMagic {
                expected: VPK_MAGIC,
                actual: magic,
            });
        }
        let major_version = r.read_u16::<LittleEndian>()?;
        let minor_version = r.read_u16::<LittleEndian>()?;
        if major_version != VPK_VERSION_MAJOR || minor_version != VPK_VERSION_MINOR {
            return Err(Error::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }
        let tree_size = r.read_u32::<LittleEndian>()?;
        let data_size = r.read_u32::<LittleEndian>()?;
        if data_size != 0 {
            return Err(Error::PreloadNotSupported(data_size));
        }

        let mut files = Vec::new();
        let mut tree = BufReader::new(r.take(tree_size as u64));
        loop {
            let ext = read_null_string(&mut tree, "extension")?;
            if ext.is_empty() {
                break;
            }
            loop {
                let path = read_null_string(&mut tree, "path")?;
                if path.is_empty() {
                    break;
                }
                loop {
                    let base = read_null_string(&mut tree, "name")?;
                    if base.is_empty() {
                        break;
                    }
                    // The single-space path is the encoding for "at root".
                    let full = if path == " " {
                        format!("{base}.{ext}")
                    } else {
                        format!("{path}/{base}.{ext}")
                    };
                    files.push(VpkFile::deserialize(&mut tree, full)?);
                }
            }
        }

        let leftover = tree.fill_buf()?.len() as u64 + tree.get_ref().limit();
        if leftover != 0 {
            return Err(Error::TreeSizeMismatch {
                declared: tree_size,
                consumed: tree_size - leftover as u32,
            });
        }

        let dir = Self {
            magic,
            major_version,
            minor_version,
            data_size,
            files,
        };

        // Cross-check: emitting what we just parsed must reproduce the
        // declared size, or one side of the codec is broken.
        let actual = dir.tree_size()?;
        if actual != tree_size {
            return Err(Error::ReserializeMismatch {
                declared: tree_size,
                actual,
            });
        }

        debug!("parsed vpk dir: {} files, tree {tree_size} bytes", dir.files.len());
        Ok(dir)
    }

    /// Write the directory header and tree. Output is byte-for-byte
    /// identical across round trips.
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        let tree_size = self.tree_size()?;
        if self.magic != VPK_MAGIC {
            return Err(Error::InvalidMagic {
                expected: VPK_MAGIC,
                actual: self.magic,
            });
        }
        if self.major_version != VPK_VERSION_MAJOR || self.minor_version != VPK_VERSION_MINOR {
            return Err(Error::UnsupportedVersion {
                major: self.major_version,
                minor: self.minor_version,
            });
        }
        if self.data_size != 0 {
            return Err(Error::PreloadNotSupported(self.data_size));
        }
        w.write_u32::<LittleEndian>(self.magic)?;
        w.write_u16::<LittleEndian>(self.major_version)?;
        w.write_u16::<LittleEndian>(self.minor_version)?;
        w.write_u32::<LittleEndian>(tree_size)?;
        w.write_u32::<LittleEndian>(self.data_size)?;
        self.write_tree(w)
    }

    /// The size of the emitted tree, via a dry-run into a counting sink.
    pub fn tree_size(&self) -> Result<u32> {
        let mut counter = CountingWriter::default();
        self.write_tree(&mut counter)?;
        Ok(counter.count as u32)
    }

    /// The file offset DIR-block chunk offsets are relative to: everything
    /// before the trailing chunk data.
    pub fn chunk_offset(&self) -> Result<u32> {
        Ok(Self::HEADER_SIZE + self.tree_size()?)
    }

    /// Sort files into an order suitable for tree emission, by
    /// (extension, parent path, base name) ascending.
    pub fn sort_files(&mut self) -> Result<()> {
        let mut keyed = std::mem::take(&mut self.files)
            .into_iter()
            .map(|f| {
                let (ext, path, base) = split_path(&f.path)?;
                Ok(((ext.to_owned(), path.to_owned(), base.to_owned()), f))
            })
            .collect::<Result<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
        self.files = keyed.into_iter().map(|(_, f)| f).collect();
        Ok(())
    }

    fn write_tree<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut seen_ext: HashSet<&str> = HashSet::new();
        let mut seen_path: HashSet<&str> = HashSet::new();
        let mut seen_base: HashSet<&str> = HashSet::new();
        let mut last_ext: Option<&str> = None;
        let mut last_path: Option<&str> = None;
        let mut last_base: Option<&str> = None;

        for f in &self.files {
            let (ext, path, base) = split_path(&f.path)?;

            if last_ext != Some(ext) {
                if !seen_ext.insert(ext) {
                    return Err(Error::UnsortedTree(ext.to_owned()));
                }
                if last_path.is_some() {
                    w.write_all(&[0])?;
                }
                if last_ext.is_some() {
                    w.write_all(&[0])?;
                }
                seen_path.clear();
                seen_base.clear();
                last_path = None;
                last_base = None;
                write_null_string(w, ext)?;
            }
            if last_path != Some(path) {
                if !seen_path.insert(path) {
                    return Err(Error::UnsortedTree(format!("{ext}/{path}")));
                }
                if last_path.is_some() {
                    w.write_all(&[0])?;
                }
                seen_base.clear();
                last_base = None;
                write_null_string(w, path)?;
            }
            if last_base != Some(base) {
                if !seen_base.insert(base) {
                    return Err(Error::UnsortedTree(format!("{ext}/{path}/{base}")));
                }
                write_null_string(w, base)?;
                f.serialize(w)?;
            }
            last_ext = Some(ext);
            last_path = Some(path);
            last_base = Some(base);
        }
        if last_path.is_some() {
            w.write_all(&[0])?;
        }
        if last_ext.is_some() {
            w.write_all(&[0])?;
        }
        w.write_all(&[0])?;
        Ok(())
    }
}

/// Split a file path into its tree triple `(ext, parent, base)`.
///
/// A path without a `/` gets the single-space sentinel as its parent, which
/// is how files at the archive root are encoded. A missing extension is an
/// error; the tree has nowhere to put such a file.
pub fn split_path(p: &str) -> Result<(&str, &str, &str)> {
    let (parent, rest) = match p.rfind('/') {
        Some(i) => (&p[..i], &p[i + 1..]),
        None => (" ", p),
    };
    match rest.rfind('.') {
        Some(i) => Ok((&rest[i + 1..], parent, &rest[..i])),
        None => Err(Error::MissingExtension(p.to_owned())),
    }
}

fn read_null_string<R: BufRead>(r: &mut R, what: &'static str) -> Result<String> {
    let mut buf = Vec::new();
    r.read_until(0, &mut buf)?;
    match buf.pop() {
        Some(0) => {}
        // EOF before the terminator.
        _ => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
    }
    String::from_utf8(buf).map_err(|_| Error::InvalidString(what))
}

fn write_null_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    w.write_all(s.as_bytes())?;
    w.write_all(&[0])?;
    Ok(())
}

#[derive(Default)]
struct CountingWriter {
    count: u64,
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.count += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::VpkChunk;
    use crate::crc::crc32;
    use crate::BlockIndex;

    fn stored_file(path: &str, payload: &[u8], offset: u64) -> VpkFile {
        VpkFile {
            path: path.into(),
            crc32: crc32(payload),
            preload_bytes: 0,
            index: BlockIndex::DIR,
            chunks: vec![VpkChunk {
                load_flags: 0,
                texture_flags: 0,
                offset,
                compressed_size: payload.len() as u64,
                uncompressed_size: payload.len() as u64,
            }],
        }
    }

    fn dir_with(files: Vec<VpkFile>) -> VpkDir {
        VpkDir {
            files,
            ..VpkDir::default()
        }
    }

    #[test]
    fn split_path_triples() {
        assert_eq!(split_path("a/b/c.ext").unwrap(), ("ext", "a/b", "c"));
        assert_eq!(split_path("a.txt").unwrap(), ("txt", " ", "a"));
        assert_eq!(split_path("x/y.z.vtf").unwrap(), ("vtf", "x", "y.z"));
        assert!(matches!(
            split_path("a/noext"),
            Err(Error::MissingExtension(_))
        ));
    }

    #[test]
    fn minimal_archive_layout() {
        let dir = dir_with(vec![stored_file("a.txt", b"hello", 0)]);

        // "txt\0" + " \0" + "a\0" + record(8) + chunk(30) + EOF(2) + 3 NULs.
        assert_eq!(dir.tree_size().unwrap(), 4 + 2 + 2 + 8 + 30 + 2 + 3);
        assert_eq!(
            dir.chunk_offset().unwrap(),
            VpkDir::HEADER_SIZE + dir.tree_size().unwrap()
        );

        let mut bytes = Vec::new();
        dir.serialize(&mut bytes).unwrap();
        assert_eq!(bytes.len() as u32, VpkDir::HEADER_SIZE + dir.tree_size().unwrap());

        // Header fields in little-endian.
        assert_eq!(&bytes[0..4], &0x55AA_1234u32.to_le_bytes());
        assert_eq!(&bytes[4..6], &2u16.to_le_bytes());
        assert_eq!(&bytes[6..8], &3u16.to_le_bytes());
        assert_eq!(&bytes[8..12], &dir.tree_size().unwrap().to_le_bytes());
        assert_eq!(&bytes[12..16], &0u32.to_le_bytes());
        // Tree opens with the extension, the root sentinel, and the base.
        assert_eq!(&bytes[16..24], b"txt\0 \0a\0");
        // The file record leads with the payload CRC.
        assert_eq!(&bytes[24..28], &crc32(b"hello").to_le_bytes());

        let parsed = VpkDir::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed, dir);

        let mut again = Vec::new();
        parsed.serialize(&mut again).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn root_sentinel_survives_round_trip() {
        let dir = dir_with(vec![stored_file("rootfile.cfg", b"x", 0)]);
        let mut bytes = Vec::new();
        dir.serialize(&mut bytes).unwrap();
        let parsed = VpkDir::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed.files[0].path, "rootfile.cfg");
    }

    #[test]
    fn grouped_tree_round_trip() {
        let mut dir = dir_with(vec![
            stored_file("scripts/a.txt", b"one", 0),
            stored_file("scripts/b.txt", b"two", 3),
            stored_file("maps/x.txt", b"three", 6),
            stored_file("maps/tex.vtf", b"four", 11),
            stored_file("root.cfg", b"five", 15),
        ]);
        dir.sort_files().unwrap();

        let mut bytes = Vec::new();
        dir.serialize(&mut bytes).unwrap();
        let parsed = VpkDir::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed, dir);

        let mut again = Vec::new();
        parsed.serialize(&mut again).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn sort_files_orders_by_ext_path_base() {
        let mut dir = dir_with(vec![
            stored_file("b/z.txt", b"1", 0),
            stored_file("a/z.vtf", b"2", 1),
            stored_file("a/y.txt", b"3", 2),
            stored_file("top.txt", b"4", 3),
        ]);
        dir.sort_files().unwrap();
        let order: Vec<&str> = dir.files.iter().map(|f| f.path.as_str()).collect();
        // " " sorts before named parents within an extension group.
        assert_eq!(order, ["top.txt", "a/y.txt", "b/z.txt", "a/z.vtf"]);
    }

    #[test]
    fn unsorted_files_are_rejected_on_write() {
        let dir = dir_with(vec![
            stored_file("a/x.txt", b"1", 0),
            stored_file("a/x.vtf", b"2", 1),
            stored_file("a/y.txt", b"3", 2),
        ]);
        let mut bytes = Vec::new();
        assert!(matches!(
            dir.serialize(&mut bytes),
            Err(Error::UnsortedTree(ref b)) if b == "txt"
        ));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let dir = dir_with(vec![stored_file("a.txt", b"hi", 0)]);
        let mut bytes = Vec::new();
        dir.serialize(&mut bytes).unwrap();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            VpkDir::deserialize(&mut bytes.as_slice()),
            Err(Error::InvalidMagic { .. })
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let dir = dir_with(vec![stored_file("a.txt", b"hi", 0)]);
        let mut bytes = Vec::new();
        dir.serialize(&mut bytes).unwrap();
        bytes[4] = 1;
        assert!(matches!(
            VpkDir::deserialize(&mut bytes.as_slice()),
            Err(Error::UnsupportedVersion { major: 1, minor: 3 })
        ));
    }

    #[test]
    fn preload_data_is_rejected() {
        let dir = dir_with(vec![stored_file("a.txt", b"hi", 0)]);
        let mut bytes = Vec::new();
        dir.serialize(&mut bytes).unwrap();
        bytes[12] = 5;
        assert!(matches!(
            VpkDir::deserialize(&mut bytes.as_slice()),
            Err(Error::PreloadNotSupported(5))
        ));
    }

    #[test]
    fn declared_tree_size_must_match() {
        let dir = dir_with(vec![stored_file("a.txt", b"hi", 0)]);
        let mut bytes = Vec::new();
        dir.serialize(&mut bytes).unwrap();

        // Declare one byte more than the tree has; the padding byte makes
        // the loop terminate cleanly but leaves the region unconsumed.
        let declared = dir.tree_size().unwrap() + 1;
        bytes[8..12].copy_from_slice(&declared.to_le_bytes());
        bytes.push(0);
        assert!(matches!(
            VpkDir::deserialize(&mut bytes.as_slice()),
            Err(Error::TreeSizeMismatch { .. })
        ));
    }

    #[test]
    fn truncated_tree_is_rejected() {
        let dir = dir_with(vec![stored_file("a.txt", b"hi", 0)]);
        let mut bytes = Vec::new();
        dir.serialize(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 4);
        assert!(VpkDir::deserialize(&mut bytes.as_slice()).is_err());
    }
}
