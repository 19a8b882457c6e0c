//! Archive family naming: `{prefix}{name}_dir.vpk` and `{name}_NNN.vpk`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::BlockIndex;

/// The file extension of a VPK.
pub const VPK_EXT: &str = ".vpk";

/// Generate the filename for one member of an archive family. The EOF
/// sentinel yields an empty string.
pub fn join_name(prefix: &str, name: &str, index: BlockIndex) -> String {
    if index == BlockIndex::EOF {
        return String::new();
    }
    let prefix = if index == BlockIndex::DIR { prefix } else { "" };
    format!("{prefix}{name}_{index}{VPK_EXT}")
}

/// The inverse of [`join_name`]: split a filename into the archive name and
/// block index.
pub fn split_name(filename: &str, prefix: &str) -> Result<(String, BlockIndex)> {
    let invalid = |reason: &str| Error::InvalidName {
        filename: filename.to_owned(),
        prefix: prefix.to_owned(),
        reason: reason.to_owned(),
    };

    let rest = filename
        .strip_suffix(VPK_EXT)
        .ok_or_else(|| invalid("missing .vpk extension"))?;

    let (rest, idx_str) = rest
        .rsplit_once('_')
        .filter(|(_, idx)| !idx.is_empty())
        .ok_or_else(|| invalid("no index suffix"))?;

    let index = if idx_str == "dir" {
        BlockIndex::DIR
    } else {
        let n: u16 = idx_str
            .parse()
            .map_err(|_| invalid("index suffix is neither dir nor a number"))?;
        BlockIndex(n)
    };

    let name = if index == BlockIndex::DIR {
        rest.strip_prefix(prefix)
            .ok_or_else(|| invalid("dir index does not carry the expected prefix"))?
    } else {
        rest
    };

    Ok((name.to_owned(), index))
}

/// Identifies an archive family on disk by directory, locale prefix, and
/// name. The family may or may not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpkRef {
    pub path: PathBuf,
    pub prefix: String,
    pub name: String,
}

impl VpkRef {
    pub fn new(path: impl Into<PathBuf>, prefix: impl Into<String>, name: impl Into<String>) -> Self {
        let path: PathBuf = path.into();
        Self {
            path: if path.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                path
            },
            prefix: prefix.into(),
            name: name.into(),
        }
    }

    /// Derive a reference from the path of any member file of the family.
    pub fn from_path(filename: &Path, prefix: &str) -> Result<Self> {
        let file = filename
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| Error::InvalidName {
                filename: filename.display().to_string(),
                prefix: prefix.to_owned(),
                reason: "not a file path".to_owned(),
            })?;
        let (name, _) = split_name(file, prefix)?;
        let dir = filename.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self::new(dir, prefix, name))
    }

    /// The on-disk path of one member of the family.
    pub fn resolve(&self, index: BlockIndex) -> PathBuf {
        self.path.join(join_name(&self.prefix, &self.name, index))
    }

    /// Remove every existing file belonging to this family. Missing files
    /// are not an error.
    pub fn delete(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut errors = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(file) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            match split_name(&file, &self.prefix) {
                Ok((name, _)) if name == self.name => {}
                _ => continue,
            }
            if let Err(e) = fs::remove_file(entry.path()) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    errors.push(e.into());
                }
            }
        }
        Error::join(errors)
    }
}
