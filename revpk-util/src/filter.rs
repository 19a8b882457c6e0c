//! Include/exclude filtering of archive entries by glob.

use revpk::match_glob_parents;

use crate::error::{Result, UtilError};

/// Filters archive files using exclude globs, with include globs negating
/// an exclusion. The `exclude_bsp_lump` list is a shortcut that excludes
/// `NNNN.bsp_lump` files by lump number.
#[derive(Debug, Clone, Default)]
pub struct IncludeExclude {
    pub exclude: Vec<String>,
    pub exclude_bsp_lump: Vec<u32>,
    pub include: Vec<String>,
}

impl IncludeExclude {
    /// Whether `path` should be skipped.
    pub fn skip(&self, path: &str) -> Result<bool> {
        let matches = |pattern: &str| -> Result<bool> {
            match_glob_parents(pattern, path).map_err(|e| UtilError::GlobMatch {
                pattern: pattern.to_owned(),
                path: path.to_owned(),
                source: e,
            })
        };

        let mut excluded = false;
        for pattern in &self.exclude {
            if matches(pattern)? {
                excluded = true;
                break;
            }
        }
        if !excluded {
            for lump in &self.exclude_bsp_lump {
                if matches(&format!("{lump:04x}.bsp_lump"))? {
                    excluded = true;
                    break;
                }
            }
        }
        for pattern in &self.include {
            if matches(pattern)? {
                excluded = false;
                break;
            }
        }
        Ok(excluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_negates_exclude() {
        let filter = IncludeExclude {
            exclude: vec!["*.txt".into()],
            include: vec!["keep.txt".into()],
            ..Default::default()
        };
        assert!(filter.skip("a/b.txt").unwrap());
        assert!(!filter.skip("a/keep.txt").unwrap());
        assert!(!filter.skip("a/b.bin").unwrap());
    }

    #[test]
    fn bsp_lump_shortcut() {
        let filter = IncludeExclude {
            exclude_bsp_lump: vec![0x28],
            ..Default::default()
        };
        assert!(filter.skip("maps/mp_x/0028.bsp_lump").unwrap());
        assert!(!filter.skip("maps/mp_x/0029.bsp_lump").unwrap());
    }

    #[test]
    fn malformed_pattern_reports_context() {
        let filter = IncludeExclude {
            exclude: vec!["[".into()],
            ..Default::default()
        };
        assert!(matches!(
            filter.skip("a"),
            Err(UtilError::GlobMatch { .. })
        ));
    }
}
