//! Identifier-to-path derivation and path hygiene.

use crate::traits::{StorageError, StorageResult};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Convert a UUID into a sharded relative path.
///
/// Every 4 hex characters become one directory level, so no directory
/// ever holds more than 65536 entries. Deterministic and injective:
/// distinct UUIDs always map to distinct paths.
pub fn uuid_to_path(uuid: Uuid) -> PathBuf {
    let hex = uuid.simple().to_string();
    let mut path = PathBuf::new();
    for chunk in hex.as_bytes().chunks(4) {
        // The simple form is pure ASCII hex.
        path.push(std::str::from_utf8(chunk).unwrap_or_default());
    }
    path
}

/// Reject relative paths that could escape a location root.
pub fn verify_relative(path: &Path) -> StorageResult<()> {
    if path.is_absolute() {
        return Err(StorageError::InvalidPath(format!(
            "{} is absolute; package paths are relative to their location",
            path.display()
        )));
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(StorageError::InvalidPath(format!(
                "{} contains a parent-directory component",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Remove the leaf directory of `relative` and every directory above it
/// that became empty, never touching `base` itself. Used to prune shard
/// directories after a package is removed.
pub fn remove_empty_dirs(relative: &Path, base: &Path) {
    let mut current = Some(relative);
    while let Some(rel) = current {
        if rel.as_os_str().is_empty() {
            break;
        }
        if std::fs::remove_dir(base.join(rel)).is_err() {
            // Not empty or already gone; stop pruning.
            break;
        }
        current = rel.parent();
    }
}
