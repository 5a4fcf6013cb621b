//! Local filesystem backend.
//!
//! Synchronous copies; the only adapter that can promise rename-level
//! atomicity. Writes land in a temporary sibling of the destination and
//! are renamed into place, so a failed transfer never leaves a partial
//! destination behind.

use crate::fsutil;
use crate::traits::{
    PackageAvailability, StorageAdapter, StorageError, StorageResult, TransferOutcome,
};
use async_trait::async_trait;
use packstore_core::config::ServiceAccount;
use packstore_core::models::{AccessProtocol, Package};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// Local (or network-mounted) filesystem adapter.
#[derive(Clone, Default)]
pub struct LocalFilesystemAdapter {
    /// When set, newly placed trees are chowned to this account.
    service_account: Option<ServiceAccount>,
}

impl LocalFilesystemAdapter {
    pub fn new(service_account: Option<ServiceAccount>) -> Self {
        LocalFilesystemAdapter { service_account }
    }

    /// Normalize ownership of the placed tree to the service account.
    /// Local-filesystem-specific; remote backends own their files.
    #[cfg(unix)]
    fn normalize_ownership(&self, root: &Path) -> StorageResult<()> {
        let Some(account) = self.service_account else {
            return Ok(());
        };

        let mut pending = vec![root.to_path_buf()];
        while let Some(path) = pending.pop() {
            std::os::unix::fs::chown(&path, Some(account.uid), Some(account.gid))?;
            if path.is_dir() {
                for entry in std::fs::read_dir(&path)? {
                    pending.push(entry?.path());
                }
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn normalize_ownership(&self, _root: &Path) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for LocalFilesystemAdapter {
    async fn move_from_storage_service(
        &self,
        source: &Path,
        destination: &Path,
        package: &Package,
        overwrite: bool,
    ) -> StorageResult<()> {
        let start = std::time::Instant::now();

        if fs::try_exists(destination).await.unwrap_or(false) {
            if !overwrite {
                return Err(StorageError::Conflict(format!(
                    "{} already exists",
                    destination.display()
                )));
            }
            self.delete(destination).await?;
        }

        let parent = destination.parent().ok_or_else(|| {
            StorageError::InvalidPath(format!("{} has no parent", destination.display()))
        })?;
        fs::create_dir_all(parent).await?;

        // Stage next to the destination, then rename into place. The
        // rename is the commit point; anything before it is discarded on
        // failure.
        let staged = parent.join(format!(".tmp-{}", Uuid::new_v4().simple()));
        if let Err(e) = fsutil::copy_recursive(source, &staged).await {
            let _ = fs::remove_dir_all(&staged).await;
            let _ = fs::remove_file(&staged).await;
            return Err(e);
        }
        fs::rename(&staged, destination).await.map_err(|e| {
            StorageError::TransferFailed(format!(
                "Failed to move staged copy into {}: {}",
                destination.display(),
                e
            ))
        })?;

        self.normalize_ownership(destination)?;

        tracing::info!(
            package_uuid = %package.uuid,
            destination = %destination.display(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local move from storage service complete"
        );

        Ok(())
    }

    async fn move_to_storage_service(
        &self,
        source: &Path,
        destination: &Path,
    ) -> StorageResult<TransferOutcome> {
        if !fs::try_exists(source).await.unwrap_or(false) {
            return Err(StorageError::NotFound(format!(
                "Nothing stored at {}",
                source.display()
            )));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fsutil::copy_recursive(source, destination).await?;

        tracing::debug!(
            source = %source.display(),
            destination = %destination.display(),
            "Local move to storage service complete"
        );
        Ok(TransferOutcome::Staged)
    }

    async fn update_package_status(
        &self,
        _package: &Package,
        _stored_path: &Path,
    ) -> StorageResult<PackageAvailability> {
        // Local content is always resident.
        Ok(PackageAvailability::Available)
    }

    async fn delete(&self, target: &Path) -> StorageResult<()> {
        match fs::metadata(target).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(target).await?,
            Ok(_) => fs::remove_file(target).await?,
            Err(_) => return Ok(()),
        }
        tracing::info!(target = %target.display(), "Local delete complete");
        Ok(())
    }

    fn protocol(&self) -> AccessProtocol {
        AccessProtocol::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packstore_core::models::PackageType;
    use tempfile::tempdir;

    fn test_package() -> Package {
        Package::new(
            Uuid::new_v4(),
            PackageType::Aip,
            Uuid::new_v4(),
            "e0a4/1934/bag".to_string(),
        )
    }

    async fn make_tree(root: &Path) {
        fs::create_dir_all(root.join("data")).await.unwrap();
        fs::write(root.join("bagit.txt"), b"BagIt-Version: 0.97\n")
            .await
            .unwrap();
        fs::write(root.join("data/test.txt"), b"test").await.unwrap();
    }

    #[tokio::test]
    async fn test_move_from_copies_tree() {
        let staging = tempdir().unwrap();
        let store = tempdir().unwrap();
        make_tree(staging.path()).await;

        let adapter = LocalFilesystemAdapter::default();
        let dest = store.path().join("e0a4/1934/bag");
        adapter
            .move_from_storage_service(staging.path(), &dest, &test_package(), false)
            .await
            .unwrap();

        assert!(dest.join("data/test.txt").exists());
        // Source stays in place; the pipeline owns staging cleanup.
        assert!(staging.path().join("bagit.txt").exists());
    }

    #[tokio::test]
    async fn test_move_from_occupied_destination_conflicts() {
        let staging = tempdir().unwrap();
        let store = tempdir().unwrap();
        make_tree(staging.path()).await;

        let adapter = LocalFilesystemAdapter::default();
        let dest = store.path().join("bag");
        fs::create_dir_all(&dest).await.unwrap();
        fs::write(dest.join("old.txt"), b"old").await.unwrap();

        let err = adapter
            .move_from_storage_service(staging.path(), &dest, &test_package(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        // Unmodified on conflict.
        assert!(dest.join("old.txt").exists());

        adapter
            .move_from_storage_service(staging.path(), &dest, &test_package(), true)
            .await
            .unwrap();
        assert!(!dest.join("old.txt").exists());
        assert!(dest.join("data/test.txt").exists());
    }

    #[tokio::test]
    async fn test_move_from_missing_source_leaves_destination_absent() {
        let store = tempdir().unwrap();
        let adapter = LocalFilesystemAdapter::default();
        let dest = store.path().join("e0a4/bag");

        let err = adapter
            .move_from_storage_service(Path::new("/nonexistent/source"), &dest, &test_package(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_move_to_stages_locally() {
        let store = tempdir().unwrap();
        let staging = tempdir().unwrap();
        make_tree(store.path()).await;

        let adapter = LocalFilesystemAdapter::default();
        let dest = staging.path().join("out");
        let outcome = adapter
            .move_to_storage_service(store.path(), &dest)
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Staged);
        assert!(dest.join("data/test.txt").exists());
    }

    #[tokio::test]
    async fn test_delete_missing_target_is_ok() {
        let store = tempdir().unwrap();
        let adapter = LocalFilesystemAdapter::default();
        adapter.delete(&store.path().join("gone")).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_content_is_always_available() {
        let adapter = LocalFilesystemAdapter::default();
        assert_eq!(
            adapter
                .update_package_status(&test_package(), Path::new("/store/pkg"))
                .await
                .unwrap(),
            PackageAvailability::Available
        );
    }
}
