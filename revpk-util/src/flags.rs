//! The `.vpkflags` rule language.
//!
//! A rule assigns load and texture flags to every path matching its glob.
//! Rules are matched in reverse order, so the last matching rule wins; a
//! path no rule matches gets `(0, 0)`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use revpk::{describe_load_flags, describe_texture_flags, match_glob_parents, VpkDir};

use crate::error::{Result, UtilError};

/// Name of the flags file at the root of a folder to be packed.
pub const VPKFLAGS_FILENAME: &str = ".vpkflags";

/// One flags rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRule {
    /// Glob matched with [`match_glob_parents`]: any path component unless
    /// anchored with a leading `/`; the bare anchor `/` matches everything.
    /// Must not contain whitespace.
    pub glob: String,
    pub load_flags: u32,
    pub texture_flags: u16,
}

impl fmt::Display for FlagRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:032b} {:016b} {}",
            self.load_flags, self.texture_flags, self.glob
        )
    }
}

type Flags = (u32, u16);

/// An ordered `.vpkflags` rule list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VpkFlags {
    rules: Vec<FlagRule>,
}

/// Check that a literal file path can appear verbatim as a rule glob.
fn check_literal_path(path: &str) -> std::result::Result<(), &'static str> {
    if path.chars().any(char::is_whitespace) {
        return Err("path contains whitespace");
    }
    if path.contains('#') {
        return Err("path contains the comment character");
    }
    if path.contains(['?', '*', '\\', '[']) {
        return Err("path contains a glob metacharacter");
    }
    Ok(())
}

impl VpkFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[FlagRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Append a rule.
    pub fn add(&mut self, glob: &str, load_flags: u32, texture_flags: u16) -> Result<()> {
        if glob.chars().any(char::is_whitespace) {
            return Err(UtilError::InvalidGlob {
                glob: glob.to_owned(),
                reason: "glob contains whitespace".to_owned(),
            });
        }
        self.rules.push(FlagRule {
            glob: glob.to_owned(),
            load_flags,
            texture_flags,
        });
        Ok(())
    }

    /// Build a rule set with one literal rule per file.
    pub fn generate_explicit(root: &VpkDir) -> Result<Self> {
        let mut rules = Vec::with_capacity(root.files.len());
        for file in &root.files {
            let load = file.load_flags()?;
            let texture = file.texture_flags()?;
            check_literal_path(&file.path).map_err(|reason| UtilError::InvalidRulePath {
                path: file.path.clone(),
                reason: reason.to_owned(),
            })?;
            rules.push(FlagRule {
                glob: file.path.clone(),
                load_flags: load,
                texture_flags: texture,
            });
        }
        Ok(Self { rules })
    }

    /// Build a minimal rule set: directories inherit the most common flags
    /// of their descendants, and rules are only emitted where a node's
    /// flags differ from its parent's.
    pub fn generate(root: &VpkDir) -> Result<Self> {
        #[derive(Default)]
        struct Node {
            flags: Flags,
            children: BTreeMap<String, usize>,
            freq: HashMap<Flags, usize>,
        }

        let mut arena: Vec<Node> = vec![Node::default()];

        for file in &root.files {
            let flags: Flags = (file.load_flags()?, file.texture_flags()?);

            let mut cur = 0;
            for seg in file.path.split('/') {
                *arena[cur].freq.entry(flags).or_insert(0) += 1;
                cur = match arena[cur].children.get(seg) {
                    Some(&child) => child,
                    None => {
                        let child = arena.len();
                        arena.push(Node {
                            flags,
                            ..Node::default()
                        });
                        let seg = seg.to_owned();
                        arena[cur].children.insert(seg, child);
                        child
                    }
                };
            }
        }

        // Give each interior node the most common flags among its
        // descendant files, breadth-first. Ties go to the smallest
        // (load, texture) pair; iterating the frequency map in sorted key
        // order makes that deterministic.
        let mut queue: Vec<usize> = vec![0];
        let mut at = 0;
        while at < queue.len() {
            let cur = queue[at];
            at += 1;
            if arena[cur].children.is_empty() {
                continue;
            }

            let mut counts: Vec<(Flags, usize)> =
                arena[cur].freq.iter().map(|(&f, &c)| (f, c)).collect();
            counts.sort_by_key(|&(f, _)| f);
            let mut max_count = 0;
            let mut best: Flags = (0, 0);
            for (flags, count) in counts {
                if count > max_count {
                    max_count = count;
                    best = flags;
                }
            }
            arena[cur].flags = best;

            queue.extend(arena[cur].children.values().copied());
        }

        // Emit depth-first in name order: the root always, any other node
        // only where it differs from its parent.
        fn walk(
            arena: &[Node],
            cur: usize,
            path: &str,
            parent: Option<Flags>,
            rules: &mut Vec<FlagRule>,
        ) -> Result<()> {
            let node = &arena[cur];
            if parent != Some(node.flags) {
                check_literal_path(path).map_err(|reason| UtilError::InvalidRulePath {
                    path: path.to_owned(),
                    reason: reason.to_owned(),
                })?;
                rules.push(FlagRule {
                    glob: path.to_owned(),
                    load_flags: node.flags.0,
                    texture_flags: node.flags.1,
                });
            }

            let prefix = if path.ends_with('/') {
                path.to_owned()
            } else {
                format!("{path}/")
            };
            for (seg, &child) in &node.children {
                walk(arena, child, &format!("{prefix}{seg}"), Some(node.flags), rules)?;
            }
            Ok(())
        }

        let mut rules = Vec::new();
        walk(&arena, 0, "/", None, &mut rules)?;
        Ok(Self { rules })
    }

    /// Verify that this rule set reproduces the flags of every file in
    /// `root`.
    pub fn test(&self, root: &VpkDir) -> Result<()> {
        for file in &root.files {
            let load = file.load_flags()?;
            let texture = file.texture_flags()?;
            let (load_got, texture_got, rule) = self.match_rule(&file.path);

            let describe_rule = || match rule {
                Some(i) => format!("rule {i}: {}", self.rules[i]),
                None => "no rule matched".to_owned(),
            };
            if load != load_got {
                return Err(UtilError::FlagMismatch {
                    path: file.path.clone(),
                    detail: format!(
                        "has load flags {load:032b}, rules give incorrect {load_got:032b} ({})",
                        describe_rule()
                    ),
                });
            }
            if texture != texture_got {
                return Err(UtilError::FlagMismatch {
                    path: file.path.clone(),
                    detail: format!(
                        "has texture flags {texture:016b}, rules give incorrect {texture_got:016b} ({})",
                        describe_rule()
                    ),
                });
            }
        }
        Ok(())
    }

    /// The load and texture flags for `path`; the last matching rule wins.
    pub fn match_path(&self, path: &str) -> (u32, u16) {
        let (load, texture, _) = self.match_rule(path);
        (load, texture)
    }

    fn match_rule(&self, path: &str) -> (u32, u16, Option<usize>) {
        for (i, rule) in self.rules.iter().enumerate().rev() {
            if match_glob_parents(&rule.glob, path).unwrap_or(false) {
                return (rule.load_flags, rule.texture_flags, Some(i));
            }
        }
        (0, 0, None)
    }

    /// Parse the `.vpkflags` text format, three whitespace-separated
    /// columns per rule with `#` comments.
    pub fn parse(s: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for (i, line) in s.lines().enumerate() {
            let line_no = i + 1;
            let line = line.split('#').next().unwrap_or_default();
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() != 3 {
                return Err(UtilError::RuleSyntax {
                    line: line_no,
                    reason: format!(
                        "expected 3 fields (load_flags texture_flags glob), got {} (note that the glob must not contain whitespace)",
                        fields.len()
                    ),
                });
            }
            let load_flags =
                u32::from_str_radix(fields[0], 2).map_err(|e| UtilError::RuleSyntax {
                    line: line_no,
                    reason: format!("parse load flags binary {:?}: {e}", fields[0]),
                })?;
            let texture_flags =
                u16::from_str_radix(fields[1], 2).map_err(|e| UtilError::RuleSyntax {
                    line: line_no,
                    reason: format!("parse texture flags binary {:?}: {e}", fields[1]),
                })?;
            rules.push(FlagRule {
                glob: fields[2].to_owned(),
                load_flags,
                texture_flags,
            });
        }
        Ok(Self { rules })
    }

    /// Like [`VpkFlags::parse`], reading from a file.
    pub fn parse_file(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }
}

impl fmt::Display for VpkFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.rules.iter().map(|r| r.glob.len()).max().unwrap_or(0).max(64);

        writeln!(
            f,
            "{:<32} {:<16} {:<width$} # {}",
            "# load flags",
            "texture flags",
            "path (last match wins, / to anchor, * supported)",
            "human-readable description (ignored)",
        )?;
        for rule in &self.rules {
            writeln!(
                f,
                "{:032b} {:016b} {:<width$} # load=[{}] texture=[{}]",
                rule.load_flags,
                rule.texture_flags,
                rule.glob,
                describe_load_flags(rule.load_flags).join(" "),
                describe_texture_flags(rule.texture_flags).join(" "),
            )?;
        }
        Ok(())
    }
}
