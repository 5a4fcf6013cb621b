//! AIP import pipeline.
//!
//! Ordered, short-circuiting steps: existence check, decompression,
//! bag validation, UUID extraction, duplicate check, location resolution,
//! placement, persistence. Bytes are transferred before the record is
//! written so no record ever references untransferred content; a
//! uniqueness violation on save is resolved once by deleting the
//! conflicting record and saving again.

use crate::bag::{extract_uuid, validate_bag};
use packstore_core::models::{Package, PackageType};
use packstore_core::store::StoreError;
use packstore_core::{AppError, Config, ProvenanceEvent, RecordStore};
use packstore_storage::factory::AdapterFactory;
use packstore_storage::paths::{remove_empty_dirs, uuid_to_path};
use packstore_storage::resolver::{LocationId, LocationResolver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// What the caller asks for.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// A bag directory or a `.tar.gz`/`.tgz` archive containing one.
    pub source_path: PathBuf,
    pub location: LocationId,
    /// Producing pipeline; falls back to any known pipeline when absent.
    pub pipeline: Option<Uuid>,
    /// Authorize destructive replacement of an existing package with the
    /// same UUID.
    pub force_replace: bool,
}

/// What the caller gets back on success.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub package: Package,
    pub replaced_existing: bool,
}

pub struct AipImportService {
    store: Arc<dyn RecordStore>,
    resolver: LocationResolver,
    factory: Arc<dyn AdapterFactory>,
    config: Config,
}

impl AipImportService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        resolver: LocationResolver,
        factory: Arc<dyn AdapterFactory>,
        config: Config,
    ) -> Self {
        AipImportService {
            store,
            resolver,
            factory,
            config,
        }
    }

    pub async fn import(&self, request: ImportRequest) -> Result<ImportOutcome, AppError> {
        let source = &request.source_path;
        let metadata = tokio::fs::metadata(source).await.map_err(|_| {
            AppError::NotFound(format!("Import source {} does not exist", source.display()))
        })?;

        // Compressed sources are extracted into a scratch dir that lives
        // until the transfer is done.
        let (_scratch, bag_root) = if metadata.is_dir() {
            (None, source.clone())
        } else {
            let dir = self.extract_archive(source).await?;
            let root = locate_bag_root(dir.path()).await?;
            (Some(dir), root)
        };

        let bag_info = validate_bag(&bag_root).await?;
        let uuid = extract_uuid(&bag_root).await?;
        info!(
            package_uuid = %uuid,
            source = %source.display(),
            payload_bytes = bag_info.payload_size,
            "Importing AIP"
        );

        // Duplicate check precedes destination resolution: a conflicting
        // UUID is reported even when the requested location is bad.
        let replaced_existing = match self.store.active_package(uuid).await? {
            Some(existing) if !request.force_replace => {
                return Err(AppError::Conflict(format!(
                    "Package {} already exists at {}; replacement must be explicitly forced",
                    uuid, existing.current_path
                )));
            }
            Some(existing) => {
                self.remove_existing(&existing).await?;
                true
            }
            None => false,
        };

        let resolved = self.resolver.resolve(request.location).await?;

        let origin_pipeline = self.resolve_pipeline(request.pipeline).await?;

        let basename = bag_root
            .file_name()
            .ok_or_else(|| {
                AppError::InvalidInput(format!("Source {} has no file name", bag_root.display()))
            })?
            .to_string_lossy()
            .to_string();
        let relative = uuid_to_path(uuid).join(&basename);
        let current_path = relative.to_string_lossy().replace('\\', "/");

        let mut package = Package::new(uuid, PackageType::Aip, resolved.location.uuid, current_path);
        package.size = bag_info.payload_size;
        package.origin_pipeline = origin_pipeline;
        ProvenanceEvent::new(
            "ingestion",
            &format!("imported from {}", source.display()),
            "success",
            &[],
        )
        .merge_into(&mut package.metadata, &[]);

        let destination = resolved.full_path.join(&relative);
        let adapter = self.factory.adapter_for(&resolved.space)?;
        adapter
            .move_from_storage_service(&bag_root, &destination, &package, request.force_replace)
            .await?;

        // Record write comes last. A concurrent import of the same UUID
        // that persisted first wins; the uniqueness violation is resolved
        // exactly once.
        if let Err(err) = self.store.save_package(&package).await {
            match err {
                StoreError::UniquenessViolation(_) => {
                    warn!(
                        package_uuid = %uuid,
                        "Duplicate record appeared during import, replacing it"
                    );
                    self.store.delete_package(uuid).await?;
                    self.store.save_package(&package).await?;
                }
                other => return Err(other.into()),
            }
        }

        info!(
            package_uuid = %uuid,
            current_path = %package.current_path,
            "AIP import complete"
        );
        Ok(ImportOutcome {
            package,
            replaced_existing,
        })
    }

    /// Extract a `.tar.gz`/`.tgz` source into a scratch directory.
    async fn extract_archive(&self, source: &Path) -> Result<tempfile::TempDir, AppError> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !name.ends_with(".tar.gz") && !name.ends_with(".tgz") {
            return Err(AppError::InvalidInput(format!(
                "Unrecognized archive extension on {}; expected .tar.gz or .tgz",
                source.display()
            )));
        }

        tokio::fs::create_dir_all(&self.config.staging_path).await?;
        let scratch = tempfile::tempdir_in(&self.config.staging_path)
            .map_err(|e| AppError::Internal(format!("Failed to create scratch dir: {}", e)))?;

        let archive_path = source.to_path_buf();
        let extract_to = scratch.path().to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), AppError> {
            let file = std::fs::File::open(&archive_path).map_err(|e| {
                AppError::Validation(format!(
                    "Cannot open archive {}: {}",
                    archive_path.display(),
                    e
                ))
            })?;
            let decoder = flate2::read::GzDecoder::new(file);
            let mut archive = tar::Archive::new(decoder);
            archive.unpack(&extract_to).map_err(|e| {
                AppError::Validation(format!(
                    "Failed to extract {}: {}",
                    archive_path.display(),
                    e
                ))
            })
        })
        .await
        .map_err(|e| AppError::Internal(format!("Extraction task failed: {}", e)))??;

        Ok(scratch)
    }

    /// Delete the bytes and record of a package being replaced, pruning
    /// emptied shard directories afterwards.
    async fn remove_existing(&self, existing: &Package) -> Result<(), AppError> {
        let resolved = self
            .resolver
            .resolve(LocationId::Uuid(existing.current_location))
            .await?;
        let adapter = self.factory.adapter_for(&resolved.space)?;
        let relative = PathBuf::from(&existing.current_path);
        adapter
            .delete(&resolved.full_path.join(&relative))
            .await?;
        if let Some(parent) = relative.parent() {
            remove_empty_dirs(parent, &resolved.full_path);
        }
        self.store.delete_package(existing.uuid).await?;
        warn!(
            package_uuid = %existing.uuid,
            previous_path = %existing.current_path,
            "Replaced existing package"
        );
        Ok(())
    }

    async fn resolve_pipeline(&self, requested: Option<Uuid>) -> Result<Option<Uuid>, AppError> {
        match requested {
            Some(uuid) => {
                let pipeline = self.store.get_pipeline(uuid).await?.ok_or_else(|| {
                    AppError::NotFound(format!("No pipeline matching {}", uuid))
                })?;
                Ok(Some(pipeline.uuid))
            }
            None => Ok(self.store.any_pipeline().await?.map(|p| p.uuid)),
        }
    }
}

/// The extracted tree's bag root: the single top-level directory when the
/// archive carried one, otherwise the extraction root itself.
async fn locate_bag_root(extracted: &Path) -> Result<PathBuf, AppError> {
    let mut entries = tokio::fs::read_dir(extracted).await.map_err(|e| {
        AppError::Internal(format!("Cannot list extracted archive: {}", e))
    })?;
    let mut dirs = Vec::new();
    let mut files = 0usize;
    while let Some(entry) = entries.next_entry().await.map_err(|e| {
        AppError::Internal(format!("Cannot list extracted archive: {}", e))
    })? {
        if entry
            .file_type()
            .await
            .map_err(|e| AppError::Internal(format!("Cannot stat extracted entry: {}", e)))?
            .is_dir()
        {
            dirs.push(entry.path());
        } else {
            files += 1;
        }
    }
    if files == 0 && dirs.len() == 1 {
        Ok(dirs.remove(0))
    } else {
        Ok(extracted.to_path_buf())
    }
}
