//! Availability orchestration for tiered backends.
//!
//! Retrieval from a slow tier follows REQUESTED -> PENDING ->
//! (AVAILABLE | FAILED). A pending recall is identified by the token the
//! backend returned; re-requesting while that token is set is a no-op, so
//! polling callers never pile duplicate recalls onto the appliance.

use packstore_core::models::{Package, TieredAttributes};
use packstore_core::{AppError, RecordStore};
use packstore_storage::traits::{PackageAvailability, StorageAdapter, TransferOutcome};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Outcome of a retrieval attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    /// Content is staged at the requested destination.
    Available,
    /// A recall is in flight; poll again later.
    Pending { request_id: String },
}

pub struct RetrievalOrchestrator {
    store: Arc<dyn RecordStore>,
}

impl RetrievalOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        RetrievalOrchestrator { store }
    }

    /// Stage the package's bytes at `destination`, recalling from the
    /// backend tier when necessary.
    ///
    /// Synchronous backends always come back `Available`. Tiered backends
    /// come back `Pending` until the appliance has restored the content;
    /// a backend that reports a failed recall surfaces as
    /// `AppError::Backend`, which is a different thing from pending.
    pub async fn ensure_local(
        &self,
        package: &Package,
        adapter: &dyn StorageAdapter,
        source: &Path,
        destination: &Path,
    ) -> Result<Retrieval, AppError> {
        let availability = adapter.update_package_status(package, source).await?;

        if availability == PackageAvailability::Recalling {
            if let Some(request_id) = pending_request_id(package) {
                info!(
                    package_uuid = %package.uuid,
                    request_id = %request_id,
                    "Recall already pending, not re-requesting"
                );
                return Ok(Retrieval::Pending {
                    request_id: request_id.to_string(),
                });
            }
        }

        match adapter.move_to_storage_service(source, destination).await? {
            TransferOutcome::Staged => {
                self.clear_recall_token(package).await?;
                Ok(Retrieval::Available)
            }
            TransferOutcome::Pending { request_id } => {
                self.record_recall_token(package, &request_id).await?;
                info!(
                    package_uuid = %package.uuid,
                    request_id = %request_id,
                    "Recall requested"
                );
                Ok(Retrieval::Pending { request_id })
            }
        }
    }

    async fn record_recall_token(
        &self,
        package: &Package,
        request_id: &str,
    ) -> Result<(), AppError> {
        let mut updated = package.clone();
        updated.tiered = Some(TieredAttributes {
            recall_request_id: Some(request_id.to_string()),
        });
        self.store.update_package(&updated).await?;
        Ok(())
    }

    /// Drop a stale token once content turned out to be resident.
    async fn clear_recall_token(&self, package: &Package) -> Result<(), AppError> {
        if pending_request_id(package).is_none() {
            return Ok(());
        }
        let mut updated = package.clone();
        updated.tiered = Some(TieredAttributes {
            recall_request_id: None,
        });
        self.store.update_package(&updated).await?;
        Ok(())
    }
}

fn pending_request_id(package: &Package) -> Option<&str> {
    package
        .tiered
        .as_ref()
        .and_then(|t| t.recall_request_id.as_deref())
}
