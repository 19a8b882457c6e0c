//! Component-wise glob matching for filter and rule patterns.

use glob::{MatchOptions, Pattern};

use crate::error::Result;

/// Shell-match `pattern` against `path`, walking parent paths, with optional
/// anchoring.
///
/// Backslashes are normalized to `/` and redundant slashes are collapsed on
/// both sides. A pattern starting with `/` is anchored: it must match the
/// whole path or one of its parent paths. An unanchored pattern additionally
/// matches against each path component's base name, so `"x"` matches
/// `"a/x/b"`. The anchored empty pattern `"/"` matches everything.
///
/// The glob primitive is shell-style (`?`, `*`, `[…]`); wildcards never
/// cross a `/`.
pub fn match_glob_parents(pattern: &str, path: &str) -> Result<bool> {
    let pattern = pattern.replace('\\', "/");
    let path = path.replace('\\', "/");
    let path = path.trim_matches('/');

    let (pattern, anchored) = match pattern.strip_prefix('/') {
        Some(rest) => (rest, true),
        None => (pattern.as_str(), false),
    };

    let pattern = normalize_slashes(pattern);
    let path = normalize_slashes(path);

    // Anchored but empty matches everything.
    if anchored && pattern.is_empty() {
        return Ok(true);
    }

    let pattern = Pattern::new(&pattern)?;
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut name = path.as_str();
    while !name.is_empty() {
        if pattern.matches_with(name, options) {
            return Ok(true);
        }
        let (parent, base) = match name.rsplit_once('/') {
            Some((parent, base)) => (parent, base),
            None => ("", name),
        };
        if !anchored && pattern.matches_with(base, options) {
            return Ok(true);
        }
        name = parent;
    }
    Ok(false)
}

/// Collapse consecutive slashes and trim leading/trailing ones.
fn normalize_slashes(s: &str) -> String {
    s.split('/').filter(|p| !p.is_empty()).collect::<Vec<_>>().join("/")
}
