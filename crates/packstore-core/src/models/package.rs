//! Package model: the central archival entity.
//!
//! A package is an AIP/SIP/DIP (or transfer / single file) tracked by the
//! storage service. It has exactly one current location at any time;
//! relocation is an atomic handoff performed by the services layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Package type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PackageType {
    Aip,
    Sip,
    Dip,
    Transfer,
    File,
}

impl Display for PackageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PackageType::Aip => write!(f, "AIP"),
            PackageType::Sip => write!(f, "SIP"),
            PackageType::Dip => write!(f, "DIP"),
            PackageType::Transfer => write!(f, "transfer"),
            PackageType::File => write!(f, "file"),
        }
    }
}

/// Lifecycle status of a package.
///
/// Created as `Uploaded` by the import pipeline, `Processing` while a
/// relocation or recall is in flight, `Failed` on unrecoverable transfer
/// error and `Deleted` after explicit removal. Deleted packages keep their
/// record but no longer count for UUID uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PackageStatus {
    Uploaded,
    Processing,
    Verified,
    Failed,
    Deleted,
}

impl Display for PackageStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            PackageStatus::Uploaded => "UPLOADED",
            PackageStatus::Processing => "PROCESSING",
            PackageStatus::Verified => "VERIFIED",
            PackageStatus::Failed => "FAILED",
            PackageStatus::Deleted => "DELETED",
        };
        write!(f, "{}", s)
    }
}

/// Compression applied to the stored package, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    None,
    Tar,
    TarBzip2,
    SevenZipBzip2,
    SevenZipLzma,
}

impl FromStr for Compression {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "tar" => Ok(Compression::Tar),
            "tar bz2" | "tar+bzip2" => Ok(Compression::TarBzip2),
            "7z with bzip" | "7z+bzip2" => Ok(Compression::SevenZipBzip2),
            "7z with lzma" | "7z+lzma" => Ok(Compression::SevenZipLzma),
            _ => Err(anyhow::anyhow!("Invalid compression algorithm: {}", s)),
        }
    }
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            Compression::None => "none",
            Compression::Tar => "tar",
            Compression::TarBzip2 => "tar bz2",
            Compression::SevenZipBzip2 => "7z with bzip",
            Compression::SevenZipLzma => "7z with lzma",
        };
        write!(f, "{}", s)
    }
}

/// Backend-specific attributes for packages stored on a tiered (tape)
/// backend. Only the tape adapter reads or writes these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieredAttributes {
    /// Token returned by the appliance when a recall was requested.
    /// Present while a recall is pending; re-requesting with a token
    /// already set is a no-op.
    pub recall_request_id: Option<String>,
}

/// An archival package tracked by the storage service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub uuid: Uuid,
    pub package_type: PackageType,
    pub status: PackageStatus,
    pub compression: Compression,
    /// Total payload size in bytes.
    pub size: i64,
    /// Path relative to the current location's root.
    pub current_path: String,
    /// UUID of the Location holding the current (only) copy.
    pub current_location: Uuid,
    /// Pipeline that produced this package, when known.
    pub origin_pipeline: Option<Uuid>,
    /// Tiered-backend attributes; `None` for packages on synchronous backends.
    pub tiered: Option<TieredAttributes>,
    /// Provenance metadata document (events and agents).
    pub metadata: JsonValue,
    pub stored_at: DateTime<Utc>,
}

impl Package {
    pub fn new(
        uuid: Uuid,
        package_type: PackageType,
        current_location: Uuid,
        current_path: String,
    ) -> Self {
        Package {
            uuid,
            package_type,
            status: PackageStatus::Uploaded,
            compression: Compression::None,
            size: 0,
            current_path,
            current_location,
            origin_pipeline: None,
            tiered: None,
            metadata: JsonValue::Null,
            stored_at: Utc::now(),
        }
    }

    /// Whether this package still occupies storage and holds its UUID.
    pub fn is_active(&self) -> bool {
        self.status != PackageStatus::Deleted
    }

    /// The filename a download of this package should carry.
    pub fn download_filename(&self) -> String {
        std::path::Path::new(&self.current_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("package")
            .to_string()
    }

    /// Whether the stored form is a single compressed file rather than a
    /// directory tree.
    pub fn is_compressed(&self) -> bool {
        self.compression != Compression::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_roundtrip() {
        for c in [
            Compression::None,
            Compression::Tar,
            Compression::TarBzip2,
            Compression::SevenZipBzip2,
            Compression::SevenZipLzma,
        ] {
            assert_eq!(c.to_string().parse::<Compression>().unwrap(), c);
        }
        assert!("gzip".parse::<Compression>().is_err());
    }

    #[test]
    fn test_download_filename() {
        let mut p = Package::new(
            Uuid::new_v4(),
            PackageType::Aip,
            Uuid::new_v4(),
            "e0a4/1934/working_bag.zip".to_string(),
        );
        assert_eq!(p.download_filename(), "working_bag.zip");
        p.current_path = String::new();
        assert_eq!(p.download_filename(), "package");
    }

    #[test]
    fn test_deleted_package_is_not_active() {
        let mut p = Package::new(
            Uuid::new_v4(),
            PackageType::Aip,
            Uuid::new_v4(),
            "a/b".to_string(),
        );
        assert!(p.is_active());
        p.status = PackageStatus::Deleted;
        assert!(!p.is_active());
    }
}
