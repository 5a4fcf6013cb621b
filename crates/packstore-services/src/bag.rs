//! BagIt bag validation.
//!
//! An imported package must arrive as a valid bag: a `bagit.txt`
//! declaration, at least one payload manifest whose checksums match the
//! files under `data/`, and no payload files missing from the manifest.

use crate::checksum::{generate_checksum, ChecksumAlgorithm};
use packstore_core::AppError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Result of a successful bag validation.
#[derive(Debug, Clone)]
pub struct BagInfo {
    /// Total size in bytes of the payload files.
    pub payload_size: i64,
    /// Number of payload files verified against the manifest.
    pub payload_file_count: usize,
    /// Manifest algorithm that was verified.
    pub algorithm: ChecksumAlgorithm,
}

const MANIFEST_CANDIDATES: &[(&str, ChecksumAlgorithm)] = &[
    ("manifest-sha512.txt", ChecksumAlgorithm::Sha512),
    ("manifest-sha256.txt", ChecksumAlgorithm::Sha256),
    ("manifest-md5.txt", ChecksumAlgorithm::Md5),
];

/// Validate the bag rooted at `bag_path`.
pub async fn validate_bag(bag_path: &Path) -> Result<BagInfo, AppError> {
    let declaration = bag_path.join("bagit.txt");
    if !tokio::fs::try_exists(&declaration)
        .await
        .map_err(|e| AppError::InternalWithSource {
            message: "Failed to stat bag".into(),
            source: e.into(),
        })?
    {
        return Err(AppError::Validation(format!(
            "{} is not a bag: missing bagit.txt",
            bag_path.display()
        )));
    }

    let (manifest_path, algorithm) = find_manifest(bag_path).await?;
    let entries = parse_manifest(&manifest_path).await?;
    if entries.is_empty() {
        return Err(AppError::Validation(format!(
            "Bag manifest {} lists no payload files",
            manifest_path.display()
        )));
    }

    let mut payload_size: i64 = 0;
    for (relative, expected) in &entries {
        let file_path = bag_path.join(relative);
        let metadata = tokio::fs::metadata(&file_path).await.map_err(|_| {
            AppError::Validation(format!(
                "Bag payload file {} listed in manifest is missing",
                relative.display()
            ))
        })?;
        let actual = generate_checksum(&file_path, algorithm)
            .await
            .map_err(|e| AppError::InternalWithSource {
                message: "Checksum failure".into(),
                source: e,
            })?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(AppError::Validation(format!(
                "Checksum mismatch for {}: manifest says {}, file is {}",
                relative.display(),
                expected,
                actual
            )));
        }
        payload_size += metadata.len() as i64;
    }

    // Every file under data/ must be accounted for.
    let payload = list_payload_files(bag_path).await?;
    for relative in &payload {
        if !entries.contains_key(relative) {
            return Err(AppError::Validation(format!(
                "Bag payload file {} is not listed in the manifest",
                relative.display()
            )));
        }
    }

    debug!(
        bag = %bag_path.display(),
        files = entries.len(),
        bytes = payload_size,
        "Bag validated"
    );

    Ok(BagInfo {
        payload_size,
        payload_file_count: entries.len(),
        algorithm,
    })
}

/// Extract the package UUID from the METS file name under `data/`.
///
/// The file is named `METS.<uuid>.xml`; the UUID occupies characters
/// 5 through 40 of the file name.
pub async fn extract_uuid(bag_path: &Path) -> Result<Uuid, AppError> {
    let data_dir = bag_path.join("data");
    let mut dir = tokio::fs::read_dir(&data_dir).await.map_err(|_| {
        AppError::Validation(format!("Bag {} has no data directory", bag_path.display()))
    })?;
    while let Some(entry) = dir
        .next_entry()
        .await
        .map_err(|e| AppError::InternalWithSource {
            message: "Failed to list bag data".into(),
            source: e.into(),
        })?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        // Filenames are caller-supplied; never byte-slice them.
        let candidate = name
            .strip_prefix("METS.")
            .and_then(|rest| rest.strip_suffix(".xml"));
        if let Some(candidate) = candidate {
            if let Ok(uuid) = Uuid::parse_str(candidate) {
                return Ok(uuid);
            }
        }
    }
    Err(AppError::Validation(format!(
        "Bag {} has no METS.<uuid>.xml file to take its UUID from",
        bag_path.display()
    )))
}

async fn find_manifest(bag_path: &Path) -> Result<(PathBuf, ChecksumAlgorithm), AppError> {
    for (name, algorithm) in MANIFEST_CANDIDATES {
        let candidate = bag_path.join(name);
        if tokio::fs::try_exists(&candidate)
            .await
            .map_err(|e| AppError::InternalWithSource {
                message: "Failed to stat manifest".into(),
                source: e.into(),
            })?
        {
            return Ok((candidate, *algorithm));
        }
    }
    Err(AppError::Validation(format!(
        "{} is not a bag: no payload manifest found",
        bag_path.display()
    )))
}

/// Manifest lines are `<checksum> <relative path>`, one per payload file.
async fn parse_manifest(path: &Path) -> Result<BTreeMap<PathBuf, String>, AppError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::InternalWithSource {
            message: "Failed to read manifest".into(),
            source: e.into(),
        })?;
    let mut entries = BTreeMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((checksum, relative)) = line.split_once(char::is_whitespace) else {
            return Err(AppError::Validation(format!(
                "Malformed manifest line in {}: {:?}",
                path.display(),
                line
            )));
        };
        entries.insert(
            PathBuf::from(relative.trim()),
            checksum.trim().to_string(),
        );
    }
    Ok(entries)
}

async fn list_payload_files(bag_path: &Path) -> Result<Vec<PathBuf>, AppError> {
    let data_dir = bag_path.join("data");
    let mut files = Vec::new();
    let mut stack = vec![data_dir.clone()];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => continue, // No data/ means no payload.
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            AppError::InternalWithSource {
                message: "Failed to walk bag payload".into(),
                source: e.into(),
            }
        })? {
            let path = entry.path();
            if entry
                .file_type()
                .await
                .map_err(|e| {
                    AppError::InternalWithSource {
                        message: "Failed to stat bag payload".into(),
                        source: e.into(),
                    }
                })?
                .is_dir()
            {
                stack.push(path);
            } else if let Ok(relative) = path.strip_prefix(bag_path) {
                files.push(relative.to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_test_bag;

    #[tokio::test]
    async fn test_valid_bag_passes() {
        let dir = tempfile::tempdir().unwrap();
        let uuid = Uuid::new_v4();
        let bag = write_test_bag(dir.path(), "working_bag", uuid).await;

        let info = validate_bag(&bag).await.unwrap();
        assert_eq!(info.payload_file_count, 2);
        assert!(info.payload_size > 0);
        assert_eq!(info.algorithm, ChecksumAlgorithm::Md5);
    }

    #[tokio::test]
    async fn test_missing_bagit_txt_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bag = write_test_bag(dir.path(), "working_bag", Uuid::new_v4()).await;
        tokio::fs::remove_file(bag.join("bagit.txt")).await.unwrap();

        let err = validate_bag(&bag).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bag = write_test_bag(dir.path(), "working_bag", Uuid::new_v4()).await;
        tokio::fs::write(bag.join("data/test.txt"), "tampered")
            .await
            .unwrap();

        let err = validate_bag(&bag).await.unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Checksum mismatch"), "got: {msg}");
    }

    #[tokio::test]
    async fn test_unlisted_payload_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bag = write_test_bag(dir.path(), "working_bag", Uuid::new_v4()).await;
        tokio::fs::write(bag.join("data/sneaky.txt"), "extra")
            .await
            .unwrap();

        let err = validate_bag(&bag).await.unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("not listed"), "got: {msg}");
    }

    #[tokio::test]
    async fn test_uuid_comes_from_mets_filename() {
        let dir = tempfile::tempdir().unwrap();
        let uuid: Uuid = "e0a41934-c1d7-45ba-9a95-a7531c063ed1".parse().unwrap();
        let bag = write_test_bag(dir.path(), "working_bag", uuid).await;

        assert_eq!(extract_uuid(&bag).await.unwrap(), uuid);
    }

    #[tokio::test]
    async fn test_mets_lookalike_with_multibyte_name_is_skipped_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let uuid = Uuid::new_v4();
        let bag = write_test_bag(dir.path(), "working_bag", uuid).await;
        tokio::fs::remove_file(bag.join(format!("data/METS.{uuid}.xml")))
            .await
            .unwrap();
        // A METS-prefixed name whose bytes 40..42 sit inside one char.
        let weird = format!("METS.x{}.xml", "é".repeat(18));
        tokio::fs::write(bag.join("data").join(weird), "<mets/>")
            .await
            .unwrap();

        let err = extract_uuid(&bag).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_mets_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let uuid = Uuid::new_v4();
        let bag = write_test_bag(dir.path(), "working_bag", uuid).await;
        tokio::fs::remove_file(bag.join(format!("data/METS.{uuid}.xml")))
            .await
            .unwrap();

        let err = extract_uuid(&bag).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
