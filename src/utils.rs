//! Common utilities shared across modules.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Make a path absolute and lexically clean.
///
/// Relative paths are resolved against the current directory, `.` segments
/// are dropped and `..` pops the previous segment. Symlinks are not
/// resolved, so the result names the same entry the caller asked for even
/// if it does not exist yet.
pub fn clean_path(path: &Path) -> io::Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty path"));
    }

    let absolute = std::path::absolute(path)?;
    let mut cleaned = PathBuf::new();

    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if !matches!(
                    cleaned.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_)) | None
                ) {
                    cleaned.pop();
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }

    Ok(cleaned)
}

/// Resolve symlinks in the directory part of an absolute path.
///
/// The file name is kept as given, so the result still names a file that
/// may not exist yet. Falls back to `path` when the parent cannot be
/// resolved. FSEvents reports canonical paths (`/private/var` for `/var`),
/// and routes must use the same form.
pub fn resolve_parent(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_clean_absolute_path() {
        let cleaned = clean_path(Path::new("/var/./log/../log/app.log")).unwrap();
        assert_eq!(cleaned, PathBuf::from("/var/log/app.log"));
    }

    #[cfg(unix)]
    #[test]
    fn test_parent_of_root_is_root() {
        let cleaned = clean_path(Path::new("/../../app.log")).unwrap();
        assert_eq!(cleaned, PathBuf::from("/app.log"));
    }

    #[test]
    fn test_relative_becomes_absolute() {
        let cleaned = clean_path(Path::new("logs/./app.log")).unwrap();
        assert!(cleaned.is_absolute());
        assert!(cleaned.ends_with("logs/app.log"));
        assert_eq!(
            cleaned,
            std::env::current_dir().unwrap().join("logs").join("app.log")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_parent_follows_dir_symlink() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let real = temp_dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let resolved = resolve_parent(&link.join("app.log"));
        assert_eq!(
            resolved,
            std::fs::canonicalize(&real).unwrap().join("app.log")
        );
    }

    #[test]
    fn test_resolve_parent_missing_dir_is_unchanged() {
        let path = std::env::temp_dir().join("tailwatch-no-such-dir").join("app.log");
        assert_eq!(resolve_parent(&path), path);
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = clean_path(Path::new("")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
