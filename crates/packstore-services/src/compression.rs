//! Compression selection and content-type mapping.
//!
//! Pointer documents written at packaging time record the identified
//! container format and the transform algorithm that produced it; new
//! reingests choose their compression from those fields.

use packstore_core::{AppError, Compression};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

const FMT_7Z: &str = "fmt/484";
const FMT_BZIP2: &str = "x-fmt/268";

/// Relevant fields of a package pointer document.
#[derive(Debug, Deserialize)]
pub struct PointerDocument {
    #[serde(default)]
    pub format_registry_key: Option<String>,
    #[serde(default)]
    pub transform_algorithm: Option<String>,
}

/// Pick the compression for a reingested package from its pointer document.
///
/// Unknown combinations fall back to 7-Zip with bzip2 so the package can
/// still be stored.
pub async fn detect_compression(pointer_path: &Path) -> Result<Compression, AppError> {
    let raw = tokio::fs::read(pointer_path).await.map_err(|e| {
        AppError::Validation(format!(
            "Could not read pointer document {}: {}",
            pointer_path.display(),
            e
        ))
    })?;
    let doc: PointerDocument = serde_json::from_slice(&raw).map_err(|e| {
        AppError::Validation(format!(
            "Pointer document {} is not valid JSON: {}",
            pointer_path.display(),
            e
        ))
    })?;
    Ok(compression_for(&doc))
}

fn compression_for(doc: &PointerDocument) -> Compression {
    let format = doc.format_registry_key.as_deref();
    let algorithm = doc.transform_algorithm.as_deref();
    match (format, algorithm) {
        (Some(FMT_7Z), Some("bzip2")) => Compression::SevenZipBzip2,
        (Some(FMT_7Z), Some("lzma")) => Compression::SevenZipLzma,
        (Some(FMT_BZIP2), _) => Compression::TarBzip2,
        (format, algorithm) => {
            warn!(
                ?format,
                ?algorithm,
                "Unrecognized compression in pointer document, defaulting to 7z with bzip"
            );
            Compression::SevenZipBzip2
        }
    }
}

/// Content type for a delivered file, keyed on its extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = filename.rsplit('.').next().unwrap_or("");
    match extension {
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Containers the access layer can open to extract a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Zip,
    Tar,
    TarGzip,
}

impl ContainerFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ContainerFormat::TarGzip)
        } else if lower.ends_with(".tar") {
            Some(ContainerFormat::Tar)
        } else if lower.ends_with(".zip") {
            Some(ContainerFormat::Zip)
        } else {
            None
        }
    }
}
