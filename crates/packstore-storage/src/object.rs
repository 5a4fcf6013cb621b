//! Replicated object-store backend.
//!
//! DuraCloud-style HTTP object store: every upload carries a Content-MD5
//! header and is verified against the checksum the store reports back, so
//! a corrupted transfer can never be mistaken for a stored object.
//! Transient network failures are retried a bounded number of times with
//! backoff; credential failures are not.

use crate::fsutil;
use crate::traits::{
    PackageAvailability, StorageAdapter, StorageError, StorageResult, TransferOutcome,
};
use async_trait::async_trait;
use md5::{Digest, Md5};
use packstore_core::models::{AccessProtocol, Package};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Replicated object store adapter.
pub struct ReplicatedObjectAdapter {
    client: reqwest::Client,
    host: String,
    user: String,
    password: String,
    store: String,
}

impl ReplicatedObjectAdapter {
    pub fn new(
        host: String,
        user: String,
        password: String,
        store: String,
        timeout_secs: u64,
    ) -> StorageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(ReplicatedObjectAdapter {
            client,
            host,
            user,
            password,
            store,
        })
    }

    /// Remote key for a path: the path itself, without a leading slash.
    fn key_for(path: &Path) -> String {
        let key = path.to_string_lossy().replace('\\', "/");
        key.trim_start_matches('/').to_string()
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://{}/durastore/{}/{}", self.host, self.store, key)
    }

    fn map_status(status: reqwest::StatusCode, key: &str) -> Option<StorageError> {
        if status.is_success() {
            return None;
        }
        Some(
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                StorageError::Credentials(format!("Object store rejected credentials for {}", key))
            } else if status == reqwest::StatusCode::NOT_FOUND {
                StorageError::NotFound(format!("No object stored at {}", key))
            } else if status.is_server_error() {
                StorageError::Transient(format!("Object store returned {} for {}", status, key))
            } else {
                StorageError::Backend(format!(
                    "Unexpected object store response {} for {}",
                    status, key
                ))
            },
        )
    }

    /// Run `operation` up to `MAX_ATTEMPTS` times, backing off between
    /// attempts. Only `Transient` errors are retried.
    async fn with_retries<T, F, Fut>(operation_name: &str, key: &str, mut operation: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = StorageResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(StorageError::Transient(msg)) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        operation = operation_name,
                        key = %key,
                        attempt,
                        error = %msg,
                        "Transient object store error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64))
                        .await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn put_object(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let checksum = hex::encode(Md5::digest(data));
        let url = self.object_url(key);

        let checksum_clone = checksum.clone();
        Self::with_retries("put", key, || {
            let request = self
                .client
                .put(&url)
                .basic_auth(&self.user, Some(&self.password))
                .header("Content-MD5", &checksum_clone)
                .body(data.to_vec());
            let key = key.to_string();
            let expected = checksum_clone.clone();
            async move {
                let response = request.send().await.map_err(|e| {
                    StorageError::Transient(format!("Object store unreachable: {}", e))
                })?;
                if let Some(err) = Self::map_status(response.status(), &key) {
                    return Err(err);
                }
                // The store echoes the checksum it computed at rest.
                if let Some(reported) = response
                    .headers()
                    .get("content-md5")
                    .and_then(|v| v.to_str().ok())
                {
                    if reported != expected {
                        return Err(StorageError::TransferFailed(format!(
                            "Checksum mismatch storing {}: sent {}, store computed {}",
                            key, expected, reported
                        )));
                    }
                }
                Ok(())
            }
        })
        .await?;

        tracing::debug!(key = %key, checksum = %checksum, "Object stored");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let url = self.object_url(key);
        Self::with_retries("get", key, || {
            let request = self
                .client
                .get(&url)
                .basic_auth(&self.user, Some(&self.password));
            let key = key.to_string();
            async move {
                let response = request.send().await.map_err(|e| {
                    StorageError::Transient(format!("Object store unreachable: {}", e))
                })?;
                if let Some(err) = Self::map_status(response.status(), &key) {
                    return Err(err);
                }
                let data = response.bytes().await.map_err(|e| {
                    StorageError::Transient(format!("Failed reading object body: {}", e))
                })?;
                Ok(data.to_vec())
            }
        })
        .await
    }

    /// Keys stored under `prefix/`, one per line.
    async fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let url = format!(
            "https://{}/durastore/{}?prefix={}/",
            self.host, self.store, prefix
        );
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| StorageError::Transient(format!("Object store unreachable: {}", e)))?;
        if let Some(err) = Self::map_status(response.status(), prefix) {
            return Err(err);
        }
        let body = response
            .text()
            .await
            .map_err(|e| StorageError::Transient(format!("Failed reading listing: {}", e)))?;
        Ok(body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Occupancy comes from the store's listing; a listing failure is a
    /// failure, never read as "destination free".
    fn ensure_destination_free(
        listing: StorageResult<Vec<String>>,
        base_key: &str,
    ) -> StorageResult<()> {
        let keys = listing?;
        if keys.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Conflict(format!(
                "Objects already stored under {}",
                base_key
            )))
        }
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let url = self.object_url(key);
        let response = self
            .client
            .delete(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| StorageError::Transient(format!("Object store unreachable: {}", e)))?;
        match Self::map_status(response.status(), key) {
            None | Some(StorageError::NotFound(_)) => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[async_trait]
impl StorageAdapter for ReplicatedObjectAdapter {
    async fn move_from_storage_service(
        &self,
        source: &Path,
        destination: &Path,
        package: &Package,
        overwrite: bool,
    ) -> StorageResult<()> {
        let base_key = Self::key_for(destination);
        if !overwrite {
            let listing = Self::with_retries("list", &base_key, || {
                let key = base_key.clone();
                async move { self.list_prefix(&key).await }
            })
            .await;
            Self::ensure_destination_free(listing, &base_key)?;
        }

        // One object per file; single files map to the key itself.
        let files = fsutil::list_files(source).await?;
        for rel in &files {
            let local = if rel.as_os_str().is_empty() {
                source.to_path_buf()
            } else {
                source.join(rel)
            };
            let key = if rel.as_os_str().is_empty() {
                base_key.clone()
            } else {
                format!("{}/{}", base_key, rel.to_string_lossy().replace('\\', "/"))
            };
            let data = fs::read(&local).await.map_err(|e| {
                StorageError::TransferFailed(format!("Failed reading {}: {}", local.display(), e))
            })?;
            self.put_object(&key, &data).await?;
        }

        tracing::info!(
            package_uuid = %package.uuid,
            key = %base_key,
            objects = files.len(),
            "Object-store move from storage service complete"
        );
        Ok(())
    }

    async fn move_to_storage_service(
        &self,
        source: &Path,
        destination: &Path,
    ) -> StorageResult<TransferOutcome> {
        let base_key = Self::key_for(source);

        match self.get_object(&base_key).await {
            Ok(data) => {
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::write(destination, &data).await?;
                return Ok(TransferOutcome::Staged);
            }
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        // Not a single object; stage the whole prefix as a tree.
        let keys = self.list_prefix(&base_key).await?;
        if keys.is_empty() {
            return Err(StorageError::NotFound(format!(
                "No object stored at {}",
                base_key
            )));
        }
        for key in keys {
            let rel = key.trim_start_matches(&base_key).trim_start_matches('/');
            let target = destination.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            let data = self.get_object(&key).await?;
            fs::write(&target, &data).await?;
        }
        Ok(TransferOutcome::Staged)
    }

    async fn update_package_status(
        &self,
        _package: &Package,
        _stored_path: &Path,
    ) -> StorageResult<PackageAvailability> {
        // Replicated objects are always online.
        Ok(PackageAvailability::Available)
    }

    async fn delete(&self, target: &Path) -> StorageResult<()> {
        let base_key = Self::key_for(target);
        self.delete_object(&base_key).await?;
        for key in self.list_prefix(&base_key).await.unwrap_or_default() {
            self.delete_object(&key).await?;
        }
        tracing::info!(key = %base_key, "Object-store delete complete");
        Ok(())
    }

    fn protocol(&self) -> AccessProtocol {
        AccessProtocol::Object
    }
}
