//! Compressed package access layer.
//!
//! Serves whole-package downloads and single-file extraction from either
//! compressed or uncompressed on-disk representations. Output is always a
//! byte stream; uncompressed trees are re-packaged into a tar stream
//! produced incrementally, with no intermediate temp file. Content on a
//! tiered backend that is not locally resident yields `Fetch::Pending`,
//! never an error.

use crate::compression::{content_type_for, ContainerFormat};
use crate::recall::{Retrieval, RetrievalOrchestrator};
use bytes::Bytes;
use futures::Stream;
use packstore_core::models::Package;
use packstore_core::{AppError, Config, RecordStore};
use packstore_storage::factory::AdapterFactory;
use packstore_storage::paths::verify_relative;
use packstore_storage::resolver::{LocationId, LocationResolver};
use packstore_storage::traits::PackageAvailability;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tracing::{debug, error};
use uuid::Uuid;

const TAR_PIPE_BUF: usize = 64 * 1024;

const NOT_LOCAL_MESSAGE: &str =
    "File is not locally available. Contact your storage administrator to fetch it.";

pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Outcome of a fetch: bytes now, or a pending recall.
pub enum Fetch {
    Delivered {
        stream: ByteStream,
        content_type: String,
        /// Disposition filename.
        filename: String,
        /// Known up front for stored files, unknown for synthesized tars.
        size: Option<u64>,
    },
    Pending {
        message: String,
    },
}

// Manual impl: the stream field is opaque.
impl std::fmt::Debug for Fetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fetch::Delivered {
                content_type,
                filename,
                size,
                ..
            } => f
                .debug_struct("Delivered")
                .field("content_type", content_type)
                .field("filename", filename)
                .field("size", size)
                .finish_non_exhaustive(),
            Fetch::Pending { message } => {
                f.debug_struct("Pending").field("message", message).finish()
            }
        }
    }
}

pub struct PackageAccessService {
    store: Arc<dyn RecordStore>,
    resolver: LocationResolver,
    factory: Arc<dyn AdapterFactory>,
    orchestrator: RetrievalOrchestrator,
    config: Config,
}

impl PackageAccessService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        resolver: LocationResolver,
        factory: Arc<dyn AdapterFactory>,
        config: Config,
    ) -> Self {
        let orchestrator = RetrievalOrchestrator::new(store.clone());
        PackageAccessService {
            store,
            resolver,
            factory,
            orchestrator,
            config,
        }
    }

    /// Fetch the whole package, or one file out of it when
    /// `relative_path` is given.
    pub async fn fetch(
        &self,
        package_uuid: Uuid,
        relative_path: Option<&str>,
    ) -> Result<Fetch, AppError> {
        if let Some(rel) = relative_path {
            if rel.is_empty() {
                return Err(AppError::InvalidInput(
                    "relative_path_to_file must not be empty".to_string(),
                ));
            }
        }

        let package = self
            .store
            .active_package(package_uuid)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No package matching {}", package_uuid))
            })?;

        let resolved = self
            .resolver
            .resolve(LocationId::Uuid(package.current_location))
            .await?;
        let adapter = self.factory.adapter_for(&resolved.space)?;
        let stored_path = resolved.full_path.join(&package.current_path);

        if adapter.update_package_status(&package, &stored_path).await?
            == PackageAvailability::Recalling
        {
            let staging = self.config.staging_path.join(package.uuid.to_string());
            match self
                .orchestrator
                .ensure_local(&package, adapter.as_ref(), &stored_path, &staging)
                .await?
            {
                Retrieval::Pending { .. } => {
                    return Ok(Fetch::Pending {
                        message: NOT_LOCAL_MESSAGE.to_string(),
                    })
                }
                // Became resident between the two calls.
                Retrieval::Available => {}
            }
        }

        // The on-disk form decides delivery: a single archive file streams
        // as-is, a directory tree gets re-packaged.
        let stored_is_dir = tokio::fs::metadata(&stored_path)
            .await
            .map_err(|e| {
                AppError::Internal(format!(
                    "Stored content for {} is missing at {}: {}",
                    package.uuid,
                    stored_path.display(),
                    e
                ))
            })?
            .is_dir();

        match relative_path {
            None => self.deliver_whole(&package, &stored_path, stored_is_dir).await,
            Some(rel) => {
                self.deliver_member(&package, &stored_path, rel, stored_is_dir)
                    .await
            }
        }
    }

    async fn deliver_whole(
        &self,
        package: &Package,
        stored_path: &Path,
        stored_is_dir: bool,
    ) -> Result<Fetch, AppError> {
        if !stored_is_dir {
            let filename = package.download_filename();
            let content_type = content_type_for(&filename).to_string();
            let (stream, size) = file_stream(stored_path).await?;
            debug!(package_uuid = %package.uuid, %filename, "Streaming stored archive");
            return Ok(Fetch::Delivered {
                stream,
                content_type,
                filename,
                size: Some(size),
            });
        }

        let root_name = package.download_filename();
        let filename = format!("{}.tar", root_name);
        debug!(package_uuid = %package.uuid, %filename, "Synthesizing tar stream");
        Ok(Fetch::Delivered {
            stream: tar_stream(stored_path.to_path_buf(), root_name),
            content_type: "application/x-tar".to_string(),
            filename,
            size: None,
        })
    }

    async fn deliver_member(
        &self,
        package: &Package,
        stored_path: &Path,
        relative: &str,
        stored_is_dir: bool,
    ) -> Result<Fetch, AppError> {
        let member = Path::new(relative);
        verify_relative(member)?;
        let filename = member
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                AppError::InvalidInput(format!("{} does not name a file", relative))
            })?;
        let content_type = content_type_for(&filename).to_string();

        if stored_is_dir {
            let file_path = member_path_in_tree(stored_path, member);
            let metadata = tokio::fs::metadata(&file_path).await.map_err(|_| {
                file_not_found(relative, package.uuid)
            })?;
            if metadata.is_dir() {
                return Err(file_not_found(relative, package.uuid));
            }
            let (stream, size) = file_stream(&file_path).await?;
            return Ok(Fetch::Delivered {
                stream,
                content_type,
                filename,
                size: Some(size),
            });
        }

        let container = ContainerFormat::from_filename(&package.download_filename())
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Cannot extract single files from {}",
                    package.download_filename()
                ))
            })?;
        let archive_path = stored_path.to_path_buf();
        let member_name = relative.to_string();
        let package_uuid = package.uuid;
        let bytes = tokio::task::spawn_blocking(move || {
            read_archive_member(&archive_path, container, &member_name, package_uuid)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Extraction task failed: {}", e)))??;

        let size = bytes.len() as u64;
        let stream: ByteStream = Box::pin(futures::stream::iter(std::iter::once(Ok::<
            _,
            std::io::Error,
        >(
            Bytes::from(bytes)
        ))));
        Ok(Fetch::Delivered {
            stream,
            content_type,
            filename,
            size: Some(size),
        })
    }
}

/// Single-file requests name members as `<package dir>/<path within>`;
/// resolve against the package's parent when the prefix matches, else
/// against the tree itself.
fn member_path_in_tree(stored_path: &Path, member: &Path) -> PathBuf {
    let package_dir = stored_path.file_name();
    let first = member.components().next();
    match (package_dir, first) {
        (Some(dir), Some(Component::Normal(head))) if dir == head => {
            match stored_path.parent() {
                Some(parent) => parent.join(member),
                None => stored_path.join(member),
            }
        }
        _ => stored_path.join(member),
    }
}

fn file_not_found(relative: &str, package: Uuid) -> AppError {
    AppError::NotFound(format!(
        "File {} not found in package {}",
        relative, package
    ))
}

async fn file_stream(path: &Path) -> Result<(ByteStream, u64), AppError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AppError::Transfer(format!("Cannot open {}: {}", path.display(), e)))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| AppError::Transfer(format!("Cannot stat {}: {}", path.display(), e)))?
        .len();
    Ok((Box::pin(ReaderStream::new(file)), size))
}

/// Tar up a directory tree into a stream, produced incrementally as the
/// consumer reads. A failure partway truncates the stream; it is logged
/// and the consumer sees early EOF.
fn tar_stream(dir: PathBuf, root_name: String) -> ByteStream {
    let (writer, reader) = tokio::io::duplex(TAR_PIPE_BUF);
    tokio::task::spawn_blocking(move || {
        let outcome = (|| -> std::io::Result<()> {
            let mut builder = tar::Builder::new(SyncIoBridge::new(writer));
            builder.append_dir_all(&root_name, &dir)?;
            let mut bridge = builder.into_inner()?;
            bridge.shutdown()?;
            Ok(())
        })();
        if let Err(e) = outcome {
            error!(dir = %dir.display(), error = %e, "Tar synthesis failed mid-stream");
        }
    });
    Box::pin(ReaderStream::new(reader))
}

fn read_archive_member(
    archive_path: &Path,
    container: ContainerFormat,
    member: &str,
    package: Uuid,
) -> Result<Vec<u8>, AppError> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        AppError::Transfer(format!("Cannot open {}: {}", archive_path.display(), e))
    })?;
    match container {
        ContainerFormat::Zip => {
            let mut archive = zip::ZipArchive::new(file).map_err(|e| {
                AppError::Validation(format!(
                    "{} is not a readable zip archive: {}",
                    archive_path.display(),
                    e
                ))
            })?;
            let mut entry = match archive.by_name(member) {
                Ok(entry) => entry,
                Err(zip::result::ZipError::FileNotFound) => {
                    return Err(file_not_found(member, package))
                }
                Err(e) => {
                    return Err(AppError::Validation(format!(
                        "Failed to read {} from {}: {}",
                        member,
                        archive_path.display(),
                        e
                    )))
                }
            };
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes).map_err(|e| {
                AppError::Transfer(format!("Failed extracting {}: {}", member, e))
            })?;
            Ok(bytes)
        }
        ContainerFormat::Tar => {
            scan_tar(tar::Archive::new(file), member, package)
        }
        ContainerFormat::TarGzip => scan_tar(
            tar::Archive::new(flate2::read::GzDecoder::new(file)),
            member,
            package,
        ),
    }
}

fn scan_tar<R: Read>(
    mut archive: tar::Archive<R>,
    member: &str,
    package: Uuid,
) -> Result<Vec<u8>, AppError> {
    let wanted = Path::new(member);
    let entries = archive.entries().map_err(|e| {
        AppError::Validation(format!("Unreadable tar archive: {}", e))
    })?;
    for entry in entries {
        let mut entry = entry.map_err(|e| {
            AppError::Validation(format!("Corrupt tar entry: {}", e))
        })?;
        let matches = entry
            .path()
            .map(|p| p.as_ref() == wanted)
            .unwrap_or(false);
        if matches {
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes).map_err(|e| {
                AppError::Transfer(format!("Failed extracting {}: {}", member, e))
            })?;
            return Ok(bytes);
        }
    }
    Err(file_not_found(member, package))
}
