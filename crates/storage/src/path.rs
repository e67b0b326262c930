//! Path validation and relative-path conversion.
//!
//! Every path that crosses a crate boundary is a POSIX-style string relative
//! to the tracked root. These helpers are the only place that converts between
//! that representation and [`Path`]s on disk.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a relative path for security and correctness.
/// Ensures that paths don't escape the tracked root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use quill_storage::validate_path;
/// assert!(validate_path("notes/today.md").is_ok());
/// assert!(validate_path("a/../file.md").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(validate_path("x/.././notes//a.md/").unwrap(), Path::new("notes/a.md"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Strip `root` from an absolute path and render the remainder as a
/// `/`-separated string, the form stored on both sides of a sync.
pub fn to_posix(root: &Path, absolute: &Path) -> Result<String> {
    let relative = absolute
        .strip_prefix(root)
        .map_err(|_| ErrorKind::InvalidPath(absolute.to_path_buf()))?;
    let validated = validate(relative)?;
    let mut parts = Vec::new();
    for component in validated.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| ErrorKind::InvalidPath(absolute.to_path_buf()))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Join a stored relative path onto `root`, rejecting anything that would
/// land outside of it.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf> {
    Ok(root.join(validate(relative)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("notes/today.md")).unwrap(), Path::new("notes/today.md"));
        assert_eq!(validate(Path::new("simple.md")).unwrap(), Path::new("simple.md"));
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(validate(Path::new("a//b//c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/./b/./c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/b/..")).unwrap(), Path::new("a"));
        assert_eq!(validate(Path::new("journal///")).unwrap(), Path::new("journal"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../etc/passwd")).is_err());
        assert!(validate(Path::new("a/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
    }

    #[test]
    fn test_empty_and_null() {
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new("./")).is_err());
        assert!(validate(Path::new("a\0b")).is_err());
    }

    #[test]
    fn test_to_posix() {
        let root = Path::new("/home/me/notes");
        assert_eq!(to_posix(root, Path::new("/home/me/notes/work/plan.md")).unwrap(), "work/plan.md");
        assert_eq!(to_posix(root, Path::new("/home/me/notes/a.md")).unwrap(), "a.md");
        // Outside of the root, or the root itself.
        assert!(to_posix(root, Path::new("/home/me/other.md")).is_err());
        assert!(to_posix(root, root).is_err());
    }

    #[test]
    fn test_resolve() {
        let root = Path::new("/srv/tree");
        assert_eq!(resolve(root, "a/b.md").unwrap(), Path::new("/srv/tree/a/b.md"));
        assert!(resolve(root, "../../escape").is_err());
    }
}
