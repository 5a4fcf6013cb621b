//! Storage adapter trait
//!
//! All storage backends implement this trait. Callers interact with a
//! `dyn StorageAdapter` resolved from a Space and never see backend wire
//! details.

use async_trait::async_trait;
use packstore_core::models::{AccessProtocol, Package};
use std::path::Path;
use thiserror::Error;

/// Storage operation errors.
///
/// "Content not resident" is deliberately absent: a tiered backend that
/// has not recalled content yet reports `TransferOutcome::Pending`, which
/// is a valid state and not a failure.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Authentication/credential failure. Fatal, never retried.
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Transient network failure; the caller may retry with backoff.
    #[error("Transient backend error: {0}")]
    Transient(String),

    /// Destination already occupied and overwrite was not authorized.
    #[error("Destination conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The transfer failed partway; the destination was left absent or
    /// unmodified and the whole transfer must be retried from the start.
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// The backend reported an error of its own (e.g. a failed recall).
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for packstore_core::AppError {
    fn from(err: StorageError) -> Self {
        use packstore_core::AppError;
        match err {
            StorageError::NotFound(msg) => AppError::NotFound(msg),
            StorageError::Conflict(msg) => AppError::Conflict(msg),
            StorageError::Backend(msg) => AppError::Backend(msg),
            StorageError::InvalidPath(msg) => AppError::InvalidInput(msg),
            StorageError::Config(msg) => AppError::Internal(msg),
            StorageError::Credentials(_)
            | StorageError::Transient(_)
            | StorageError::TransferFailed(_) => AppError::Transfer(err.to_string()),
            StorageError::Io(e) => AppError::Transfer(format!("IO error: {}", e)),
        }
    }
}

/// Outcome of staging content from a backend to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Bytes are fully present at the requested destination.
    Staged,
    /// The backend accepted a recall request; content will become
    /// resident later. Not an error.
    Pending {
        /// Backend token identifying the recall request.
        request_id: String,
    },
}

/// Per-package availability on backends with asynchronous state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageAvailability {
    /// Content is locally resident and can be read now.
    Available,
    /// A recall is in flight; poll again later.
    Recalling,
}

/// Uniform move-in/move-out contract implemented per backend.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Copy bytes from the service's staging area to `destination` on the
    /// backend. Atomic from the caller's perspective: on error the
    /// destination is left absent or unmodified. An occupied destination
    /// is a `Conflict` unless `overwrite` is set.
    async fn move_from_storage_service(
        &self,
        source: &Path,
        destination: &Path,
        package: &Package,
        overwrite: bool,
    ) -> StorageResult<()>;

    /// Stage `source` (a backend path) at the local `destination`. Tiered
    /// backends return `Pending` instead of blocking when content is not
    /// locally resident.
    async fn move_to_storage_service(
        &self,
        source: &Path,
        destination: &Path,
    ) -> StorageResult<TransferOutcome>;

    /// Poll current availability for backends with asynchronous state.
    /// `stored_path` is the absolute backend path of the package's
    /// content, the same path transfers address, so status polls and
    /// transfers always query the backend about the same object. The
    /// answer is not guaranteed cached; synchronous backends always
    /// report `Available` for content they hold.
    async fn update_package_status(
        &self,
        package: &Package,
        stored_path: &Path,
    ) -> StorageResult<PackageAvailability>;

    /// Remove `target` from the backend. Missing targets are not an error.
    async fn delete(&self, target: &Path) -> StorageResult<()>;

    /// The protocol tag this adapter serves.
    fn protocol(&self) -> AccessProtocol;
}
