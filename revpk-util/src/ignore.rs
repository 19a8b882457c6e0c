//! The `.vpkignore` rule language.
//!
//! Gitignore-like: case-sensitive globs, one per line, optionally negated
//! with a `!` prefix. Rules are checked top to bottom; the first match
//! tentatively excludes the file unless a later negated rule also matches
//! it, and a matching negated rule includes the file for good.

use std::fmt;
use std::path::Path;

use revpk::{match_glob_parents, VpkDir};

use crate::error::{Result, UtilError};

/// Name of the ignore file at the root of a folder to be packed.
pub const VPKIGNORE_FILENAME: &str = ".vpkignore";

#[derive(Debug, Clone, PartialEq, Eq)]
struct IgnoreRule {
    glob: String,
    negate: bool,
}

impl fmt::Display for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            write!(f, "!{}", self.glob)
        } else {
            f.write_str(&self.glob)
        }
    }
}

/// An ordered `.vpkignore` rule list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VpkIgnore {
    rules: Vec<IgnoreRule>,
}

impl VpkIgnore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Seed the general-purpose default rules: nested VPKs, VPK workspace
    /// files, VCS and editor state, and assorted OS cruft.
    pub fn add_default(&mut self) {
        for glob in [
            "*.vpk",
            "/.vpk*",
            ".nfs*",
            ".directory",
            ".Trash-*",
            "System Volume Information",
            "Thumbs.db",
            "Thumbs.db:encryptable",
            "Desktop.ini",
            "ehthumbs.db",
            "ehthumbs_vista.db",
            ".DS_Store",
            ".AppleDouble",
            ".LSOverride",
            ".DocumentRevisions-V100",
            ".fseventsd",
            ".Spotlight-V100",
            ".TemporaryItems",
            ".Trashes",
            ".VolumeIcon.icns",
            ".com.apple.timemachine.donotpresent",
            ".vscode",
            ".idea",
            ".git*",
            ".fr-*",
            "[._]*.s[a-v][a-z]",
            "*.swp",
            "*.part",
            "._*",
            "~*",
            "*~",
            ".example_for_negated_rules_*",
        ] {
            self.rules.push(IgnoreRule {
                glob: glob.to_owned(),
                negate: false,
            });
        }
        self.rules.push(IgnoreRule {
            glob: ".example_for_negated_rules_include_me".to_owned(),
            negate: true,
        });
    }

    /// Append a rule.
    pub fn add(&mut self, glob: &str, negate: bool) -> Result<()> {
        let reject = |reason: &str| {
            Err(UtilError::InvalidGlob {
                glob: glob.to_owned(),
                reason: reason.to_owned(),
            })
        };
        if glob.starts_with('!') {
            return reject("glob starts with the negation character");
        }
        if glob.contains('#') {
            return reject("glob contains the comment character");
        }
        if glob.contains(['\n', '\r']) {
            return reject("glob contains newlines or carriage returns");
        }
        if glob.trim() != glob {
            return reject("glob has leading or trailing whitespace");
        }
        self.rules.push(IgnoreRule {
            glob: glob.to_owned(),
            negate,
        });
        Ok(())
    }

    /// For every file of `root` the current rules would ignore, append an
    /// anchored negated rule so a later repack still includes it.
    pub fn add_auto_exclusions(&mut self, root: &VpkDir) -> Result<()> {
        for file in &root.files {
            if !self.matches(&file.path) {
                continue;
            }
            if file.path.contains(['?', '*', '\\', '[']) {
                return Err(UtilError::InvalidRulePath {
                    path: file.path.clone(),
                    reason: "path contains a glob metacharacter".to_owned(),
                });
            }
            self.add(&format!("/{}", file.path), true)?;
        }
        Ok(())
    }

    /// Whether `path` should be ignored.
    pub fn matches(&self, path: &str) -> bool {
        let mut excluding = false;
        for rule in &self.rules {
            // Before the first exclusion only plain rules matter; after it
            // only negations can change the outcome.
            if excluding != rule.negate {
                continue;
            }
            if match_glob_parents(&rule.glob, path).unwrap_or(false) {
                if rule.negate {
                    return false;
                }
                excluding = true;
            }
        }
        excluding
    }

    /// Parse the `.vpkignore` text format.
    pub fn parse(s: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for line in s.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let (glob, negate) = match line.strip_prefix('!') {
                Some(rest) => (rest.trim(), true),
                None => (line, false),
            };
            rules.push(IgnoreRule {
                glob: glob.to_owned(),
                negate,
            });
        }
        Ok(Self { rules })
    }

    /// Like [`VpkIgnore::parse`], reading from a file.
    pub fn parse_file(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }
}

impl fmt::Display for VpkIgnore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("# list of glob patterns to be excluded when repacking the vpk\n")?;
        f.write_str("# - use a leading slash to anchor the path\n")?;
        f.write_str("# - use an exclamation mark prefix to negate the pattern\n")?;
        f.write_str("# - patterns are scanned from start to end\n")?;
        f.write_str(
            "# - the first matched rule sets the file as excluded unless a negated rule afterwards also matches it\n",
        )?;
        f.write_str("# - no further rules are matched after a negated exclusion\n")?;
        f.write_str("\n")?;
        for rule in &self.rules {
            writeln!(f, "{rule}")?;
        }
        Ok(())
    }
}
