//! Shared filesystem helpers for adapters that touch local paths.

use crate::traits::{StorageError, StorageResult};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Copy a file or directory tree. Parent directories of `dst` must exist.
pub(crate) async fn copy_recursive(src: &Path, dst: &Path) -> StorageResult<()> {
    let meta = fs::metadata(src)
        .await
        .map_err(|e| StorageError::NotFound(format!("{}: {}", src.display(), e)))?;

    if meta.is_file() {
        fs::copy(src, dst).await.map_err(|e| {
            StorageError::TransferFailed(format!(
                "Failed to copy {} to {}: {}",
                src.display(),
                dst.display(),
                e
            ))
        })?;
        return Ok(());
    }

    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).await?;
        let mut entries = fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let entry_from = entry.path();
            let entry_to = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry_from, entry_to));
            } else {
                fs::copy(&entry_from, &entry_to).await.map_err(|e| {
                    StorageError::TransferFailed(format!(
                        "Failed to copy {} to {}: {}",
                        entry_from.display(),
                        entry_to.display(),
                        e
                    ))
                })?;
            }
        }
    }
    Ok(())
}

/// Total size in bytes of a file or of all files under a directory.
pub async fn tree_size(path: &Path) -> StorageResult<u64> {
    let meta = fs::metadata(path)
        .await
        .map_err(|e| StorageError::NotFound(format!("{}: {}", path.display(), e)))?;
    if meta.is_file() {
        return Ok(meta.len());
    }

    let mut total = 0u64;
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

/// Every regular file under `path` (or `path` itself for a file), with
/// paths relative to `path`.
pub(crate) async fn list_files(path: &Path) -> StorageResult<Vec<PathBuf>> {
    let meta = fs::metadata(path)
        .await
        .map_err(|e| StorageError::NotFound(format!("{}: {}", path.display(), e)))?;
    if meta.is_file() {
        return Ok(vec![PathBuf::new()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                pending.push(entry.path());
            } else {
                let rel = entry
                    .path()
                    .strip_prefix(path)
                    .map_err(|e| StorageError::InvalidPath(e.to_string()))?
                    .to_path_buf();
                files.push(rel);
            }
        }
    }
    files.sort();
    Ok(files)
}
