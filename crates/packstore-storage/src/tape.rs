//! Tape-tiered appliance backend.
//!
//! The appliance exposes its content through a local mount plus an HTTP
//! API. Writes land on the mount and migrate to tape on the appliance's
//! schedule; reads may find content offline, in which case a recall is
//! requested and the caller is told `Pending` rather than blocked.

use crate::fsutil;
use crate::traits::{
    PackageAvailability, StorageAdapter, StorageError, StorageResult, TransferOutcome,
};
use async_trait::async_trait;
use packstore_core::models::{AccessProtocol, Package};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Per-file state reported by the appliance.
#[derive(Debug, Clone, Deserialize)]
pub struct FileInfo {
    /// "green" (replicated), "amber" (replication in progress) or "red"
    /// (replication error).
    #[serde(rename = "replicationState")]
    pub replication_state: String,
    /// Whether a copy is currently on the disk cache.
    #[serde(default)]
    pub local: bool,
    /// Recall request token when one is outstanding.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Tape-tiered backend adapter.
pub struct TieredTapeAdapter {
    client: reqwest::Client,
    host: String,
    remote_mount: PathBuf,
}

impl TieredTapeAdapter {
    pub fn new(host: String, remote_mount: PathBuf, timeout_secs: u64) -> StorageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(TieredTapeAdapter {
            client,
            host,
            remote_mount,
        })
    }

    fn api_url(&self, operation: &str, rel_path: &str) -> String {
        format!("https://{}/api/2/files/{}/{}", self.host, operation, rel_path)
    }

    /// Appliance-relative form of a path under the mount.
    fn rel_path(&self, path: &Path) -> StorageResult<String> {
        let rel = path.strip_prefix(&self.remote_mount).map_err(|_| {
            StorageError::InvalidPath(format!(
                "{} is not under the appliance mount {}",
                path.display(),
                self.remote_mount.display()
            ))
        })?;
        Ok(rel.to_string_lossy().replace('\\', "/"))
    }

    fn map_request_error(err: reqwest::Error) -> StorageError {
        if err.is_timeout() || err.is_connect() {
            StorageError::Transient(format!("Appliance unreachable: {}", err))
        } else {
            StorageError::Backend(format!("Appliance request failed: {}", err))
        }
    }

    fn check_response_status(status: reqwest::StatusCode, rel_path: &str) -> StorageResult<()> {
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(StorageError::Credentials(format!(
                "Appliance rejected credentials for {}",
                rel_path
            )));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(format!(
                "Appliance has no record of {}",
                rel_path
            )));
        }
        if status.is_server_error() {
            return Err(StorageError::Backend(format!(
                "Appliance returned {} for {}",
                status, rel_path
            )));
        }
        if !status.is_success() {
            return Err(StorageError::Backend(format!(
                "Unexpected appliance response {} for {}",
                status, rel_path
            )));
        }
        Ok(())
    }

    async fn file_info(&self, rel_path: &str) -> StorageResult<FileInfo> {
        let url = self.api_url("fileInfo", rel_path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Self::check_response_status(response.status(), rel_path)?;
        response
            .json::<FileInfo>()
            .await
            .map_err(|e| StorageError::Backend(format!("Malformed file info for {}: {}", rel_path, e)))
    }

    /// Ask the appliance to bring an offline file back to disk cache.
    /// The appliance treats repeated requests for the same path as one.
    pub async fn request_recall(&self, rel_path: &str) -> StorageResult<String> {
        let url = self.api_url("release", rel_path);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Self::check_response_status(response.status(), rel_path)?;
        let info: FileInfo = response.json().await.map_err(|e| {
            StorageError::Backend(format!("Malformed recall response for {}: {}", rel_path, e))
        })?;
        let request_id = info
            .request_id
            .unwrap_or_else(|| rel_path.to_string());

        tracing::info!(path = %rel_path, request_id = %request_id, "Recall requested");
        Ok(request_id)
    }

    fn availability_for(info: &FileInfo, rel_path: &str) -> StorageResult<PackageAvailability> {
        match info.replication_state.as_str() {
            "red" => Err(StorageError::Backend(format!(
                "Appliance reports a replication error for {}",
                rel_path
            ))),
            _ if info.local => Ok(PackageAvailability::Available),
            _ => Ok(PackageAvailability::Recalling),
        }
    }
}

#[async_trait]
impl StorageAdapter for TieredTapeAdapter {
    async fn move_from_storage_service(
        &self,
        source: &Path,
        destination: &Path,
        package: &Package,
        overwrite: bool,
    ) -> StorageResult<()> {
        // Writes go through the mount; the appliance migrates to tape on
        // its own schedule.
        if fs::try_exists(destination).await.unwrap_or(false) && !overwrite {
            return Err(StorageError::Conflict(format!(
                "{} already exists",
                destination.display()
            )));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fsutil::copy_recursive(source, destination).await?;

        tracing::info!(
            package_uuid = %package.uuid,
            destination = %destination.display(),
            "Tape move from storage service complete; replication pending on appliance"
        );
        Ok(())
    }

    async fn move_to_storage_service(
        &self,
        source: &Path,
        destination: &Path,
    ) -> StorageResult<TransferOutcome> {
        let rel = self.rel_path(source)?;
        let info = self.file_info(&rel).await?;

        match Self::availability_for(&info, &rel)? {
            PackageAvailability::Available => {
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fsutil::copy_recursive(source, destination).await?;
                Ok(TransferOutcome::Staged)
            }
            PackageAvailability::Recalling => {
                let request_id = match info.request_id {
                    // A recall is already outstanding; do not issue another.
                    Some(id) => id,
                    None => self.request_recall(&rel).await?,
                };
                Ok(TransferOutcome::Pending { request_id })
            }
        }
    }

    async fn update_package_status(
        &self,
        package: &Package,
        stored_path: &Path,
    ) -> StorageResult<PackageAvailability> {
        // Same mount-relative derivation transfers use, so polls and
        // recalls address one appliance path per package.
        let rel = self.rel_path(stored_path)?;
        let info = self.file_info(&rel).await?;
        tracing::debug!(package_uuid = %package.uuid, path = %rel, state = %info.replication_state, "Polled appliance");
        Self::availability_for(&info, &rel)
    }

    async fn delete(&self, target: &Path) -> StorageResult<()> {
        match fs::metadata(target).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(target).await?,
            Ok(_) => fs::remove_file(target).await?,
            Err(_) => return Ok(()),
        }
        tracing::info!(target = %target.display(), "Tape-backed delete complete");
        Ok(())
    }

    fn protocol(&self) -> AccessProtocol {
        AccessProtocol::Tape
    }
}
