//! Discovery and management of the `.factdb/` directory.
//!
//! The `.factdb/` directory anchors a store: the database file, the
//! configuration, and (when replication is on) the shared log path all
//! resolve relative to it. It is found by walking up the directory tree,
//! with the `FACTDB_DIR` environment variable as an override.

use std::path::{Path, PathBuf};

use crate::config::ConfigError;

/// The name of the factdb metadata directory.
const FACTDB_DIR_NAME: &str = ".factdb";

/// Environment variable that overrides directory discovery.
const FACTDB_DIR_ENV: &str = "FACTDB_DIR";

/// Walk up the directory tree from `start` looking for a `.factdb/`
/// directory.
///
/// Returns `None` if the filesystem root is reached without finding one.
/// The `FACTDB_DIR` environment variable is checked first.
pub fn find_factdb_dir(start: &Path) -> Option<PathBuf> {
    if let Ok(env_dir) = std::env::var(FACTDB_DIR_ENV) {
        let env_path = PathBuf::from(&env_dir);
        if env_path.is_dir() {
            return Some(env_path);
        }
    }

    let start = start.canonicalize().ok()?;
    let mut current = start.as_path();
    loop {
        let candidate = current.join(FACTDB_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent,
            _ => break,
        }
    }

    None
}

/// As [`find_factdb_dir`], converting `None` into an error.
pub fn find_factdb_dir_or_error(start: &Path) -> Result<PathBuf, ConfigError> {
    find_factdb_dir(start).ok_or(ConfigError::DirNotFound)
}

/// Ensure a `.factdb/` directory exists at (or under) the given path and
/// return it.
pub fn ensure_factdb_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let dir = if path.ends_with(FACTDB_DIR_NAME) {
        path.to_path_buf()
    } else {
        path.join(FACTDB_DIR_NAME)
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_in_same_dir() {
        let dir = tempfile::tempdir().unwrap();
        let meta = dir.path().join(".factdb");
        std::fs::create_dir(&meta).unwrap();

        let found = find_factdb_dir(dir.path()).unwrap();
        assert_eq!(
            found.canonicalize().unwrap(),
            meta.canonicalize().unwrap()
        );
    }

    #[test]
    fn find_from_nested_child() {
        let dir = tempfile::tempdir().unwrap();
        let meta = dir.path().join(".factdb");
        std::fs::create_dir(&meta).unwrap();
        let child = dir.path().join("a").join("b");
        std::fs::create_dir_all(&child).unwrap();

        let found = find_factdb_dir(&child).unwrap();
        assert_eq!(
            found.canonicalize().unwrap(),
            meta.canonicalize().unwrap()
        );
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // May still find one from a parent in odd environments; only check
        // the error conversion on a root-less walk result.
        if find_factdb_dir(dir.path()).is_none() {
            assert!(matches!(
                find_factdb_dir_or_error(dir.path()),
                Err(ConfigError::DirNotFound)
            ));
        }
    }

    #[test]
    fn ensure_creates_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = ensure_factdb_dir(dir.path()).unwrap();
        assert!(first.is_dir());
        assert!(first.ends_with(".factdb"));
        let second = ensure_factdb_dir(dir.path()).unwrap();
        assert_eq!(first, second);
    }
}
