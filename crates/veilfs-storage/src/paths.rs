//! Overlay path handling.
//!
//! Paths are `/`-separated and always relative to the backend root; a
//! leading `/` is accepted and ignored. `.` and empty components are
//! dropped, `..` pops a component but may never climb above the root.

use veilfs_core::{VeilError, VeilResult};

/// Normalize `path` to `a/b/c` form (no leading or trailing slash).
/// The root normalizes to the empty string.
pub fn normalize(path: &str) -> VeilResult<String> {
    if path.contains('\0') || path.contains('\\') {
        return Err(VeilError::InvalidPath(format!(
            "'{}' contains a NUL or backslash",
            path.escape_debug()
        )));
    }

    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(VeilError::InvalidPath(format!(
                        "'{path}' escapes the storage root"
                    )));
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Parent of a normalized path (`""` for top-level entries and the root).
pub fn parent(normalized: &str) -> &str {
    normalized.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Final component of a normalized path (`""` for the root).
pub fn basename(normalized: &str) -> &str {
    normalized.rsplit_once('/').map_or(normalized, |(_, name)| name)
}

/// Join `name` onto `dir` and normalize the result.
pub fn join(dir: &str, name: &str) -> VeilResult<String> {
    normalize(&format!("{dir}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_join() {
        assert_eq!(join("/docs", "a.txt").unwrap(), "docs/a.txt");
        assert_eq!(join("", "a.txt").unwrap(), "a.txt");
        assert_eq!(join("docs/sub", "../b").unwrap(), "docs/b");
        assert!(join("", "../x").is_err());
    }

    #[test]
    fn test_normalize_variants() {
        assert_eq!(normalize("/a.txt").unwrap(), "a.txt");
        assert_eq!(normalize("./test_dir").unwrap(), "test_dir");
        assert_eq!(normalize("a//b/./c/").unwrap(), "a/b/c");
        assert_eq!(normalize("a/b/../c").unwrap(), "a/c");
        assert_eq!(normalize("/").unwrap(), "");
        assert_eq!(normalize("").unwrap(), "");
    }

    #[test]
    fn test_normalize_rejects_escape() {
        assert!(matches!(normalize("../etc/passwd"), Err(VeilError::InvalidPath(_))));
        assert!(normalize("a/../../b").is_err());
    }

    #[test]
    fn test_normalize_rejects_backslash_and_nul() {
        assert!(normalize("a\\b").is_err());
        assert!(normalize("a\0b").is_err());
    }

    #[test]
    fn test_parent_and_basename() {
        assert_eq!(parent("a/b/c.txt"), "a/b");
        assert_eq!(parent("c.txt"), "");
        assert_eq!(basename("a/b/c.txt"), "c.txt");
        assert_eq!(basename("c.txt"), "c.txt");
        assert_eq!(basename(""), "");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(parts in proptest::collection::vec("[a-z.]{0,4}", 0..6)) {
            let path = parts.join("/");
            if let Ok(once) = normalize(&path) {
                prop_assert_eq!(normalize(&once).unwrap(), once.clone());
                prop_assert!(!once.starts_with('/') && !once.ends_with('/'));
            }
        }
    }
}
