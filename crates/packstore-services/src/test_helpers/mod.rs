//! Shared test fixtures: bag builders, archive builders and a stub
//! storage adapter with scriptable availability.

use crate::checksum::{checksum_bytes, ChecksumAlgorithm};
use async_trait::async_trait;
use packstore_core::models::{AccessProtocol, Package, Space};
use packstore_storage::factory::AdapterFactory;
use packstore_storage::traits::{
    PackageAvailability, StorageAdapter, StorageError, StorageResult, TransferOutcome,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Write a minimal valid bag named `name` under `root` and return its path.
///
/// Payload: `data/test.txt` containing `test` and a `data/METS.<uuid>.xml`
/// stub, both listed in `manifest-md5.txt`. Tag files are covered by
/// `tagmanifest-md5.txt` the way real bags carry it.
pub async fn write_test_bag(root: &Path, name: &str, uuid: Uuid) -> PathBuf {
    let bag = root.join(name);
    let data = bag.join("data");
    tokio::fs::create_dir_all(&data).await.expect("create bag dirs");

    let bagit = "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n";
    let bag_info = "Payload-Oxum: to-be-ignored\n";
    let payload = b"test";
    let mets = format!("<mets uuid=\"{uuid}\"/>\n");
    let mets_name = format!("METS.{uuid}.xml");

    tokio::fs::write(bag.join("bagit.txt"), bagit)
        .await
        .expect("write bagit.txt");
    tokio::fs::write(bag.join("bag-info.txt"), bag_info)
        .await
        .expect("write bag-info.txt");
    tokio::fs::write(data.join("test.txt"), payload)
        .await
        .expect("write payload");
    tokio::fs::write(data.join(&mets_name), &mets)
        .await
        .expect("write METS");

    let manifest = format!(
        "{} data/test.txt\n{} data/{}\n",
        checksum_bytes(payload, ChecksumAlgorithm::Md5),
        checksum_bytes(mets.as_bytes(), ChecksumAlgorithm::Md5),
        mets_name
    );
    tokio::fs::write(bag.join("manifest-md5.txt"), &manifest)
        .await
        .expect("write manifest");

    let tagmanifest = format!(
        "{} bagit.txt\n{} bag-info.txt\n{} manifest-md5.txt\n",
        checksum_bytes(bagit.as_bytes(), ChecksumAlgorithm::Md5),
        checksum_bytes(bag_info.as_bytes(), ChecksumAlgorithm::Md5),
        checksum_bytes(manifest.as_bytes(), ChecksumAlgorithm::Md5),
    );
    tokio::fs::write(bag.join("tagmanifest-md5.txt"), tagmanifest)
        .await
        .expect("write tagmanifest");

    bag
}

/// Pack `bag_path` into `<output>` as a gzipped tar whose entries are
/// prefixed with the bag's directory name.
pub fn tar_gz_bag(bag_path: &Path, output: &Path) {
    let file = std::fs::File::create(output).expect("create tar.gz");
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let name = bag_path.file_name().expect("bag name").to_string_lossy();
    builder
        .append_dir_all(name.as_ref(), bag_path)
        .expect("append bag to tar");
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip");
}

/// Pack `bag_path` into a zip archive at `output`, entries prefixed with
/// the bag's directory name.
pub fn zip_bag(bag_path: &Path, output: &Path) {
    let file = std::fs::File::create(output).expect("create zip");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    let prefix = bag_path.file_name().expect("bag name").to_string_lossy();

    let mut stack = vec![bag_path.to_path_buf()];
    let mut files = Vec::new();
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).expect("read bag dir") {
            let path = entry.expect("dir entry").path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    for path in files {
        let relative = path.strip_prefix(bag_path).expect("bag-relative path");
        let entry_name = format!("{}/{}", prefix, relative.to_string_lossy());
        writer.start_file(entry_name, options).expect("zip entry");
        let data = std::fs::read(&path).expect("read bag file");
        writer.write_all(&data).expect("write zip entry");
    }
    writer.finish().expect("finish zip");
}

enum StubBehavior {
    Available,
    Recalling { request_id: String },
    Failing(Box<dyn Fn() -> StorageError + Send + Sync>),
}

/// Adapter with scriptable availability for orchestrator and access tests.
pub struct StubAdapter {
    behavior: StubBehavior,
    move_to_calls: AtomicUsize,
}

impl StubAdapter {
    pub fn available() -> Self {
        StubAdapter {
            behavior: StubBehavior::Available,
            move_to_calls: AtomicUsize::new(0),
        }
    }

    pub fn recalling(request_id: &str) -> Self {
        StubAdapter {
            behavior: StubBehavior::Recalling {
                request_id: request_id.to_string(),
            },
            move_to_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing<F>(error: F) -> Self
    where
        F: Fn() -> StorageError + Send + Sync + 'static,
    {
        StubAdapter {
            behavior: StubBehavior::Failing(Box::new(error)),
            move_to_calls: AtomicUsize::new(0),
        }
    }

    pub fn move_to_calls(&self) -> usize {
        self.move_to_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageAdapter for StubAdapter {
    async fn move_from_storage_service(
        &self,
        _source: &Path,
        _destination: &Path,
        _package: &Package,
        _overwrite: bool,
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn move_to_storage_service(
        &self,
        _source: &Path,
        _destination: &Path,
    ) -> StorageResult<TransferOutcome> {
        self.move_to_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            StubBehavior::Available => Ok(TransferOutcome::Staged),
            StubBehavior::Recalling { request_id } => Ok(TransferOutcome::Pending {
                request_id: request_id.clone(),
            }),
            StubBehavior::Failing(error) => Err(error()),
        }
    }

    async fn update_package_status(
        &self,
        _package: &Package,
        _stored_path: &Path,
    ) -> StorageResult<PackageAvailability> {
        match &self.behavior {
            StubBehavior::Available => Ok(PackageAvailability::Available),
            StubBehavior::Recalling { .. } => Ok(PackageAvailability::Recalling),
            StubBehavior::Failing(error) => Err(error()),
        }
    }

    async fn delete(&self, _target: &Path) -> StorageResult<()> {
        Ok(())
    }

    fn protocol(&self) -> AccessProtocol {
        AccessProtocol::Tape
    }
}

/// Factory handing out one fixed adapter regardless of the space.
pub struct FixedAdapterFactory {
    adapter: Arc<dyn StorageAdapter>,
}

impl FixedAdapterFactory {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        FixedAdapterFactory { adapter }
    }
}

impl AdapterFactory for FixedAdapterFactory {
    fn adapter_for(&self, _space: &Space) -> StorageResult<Arc<dyn StorageAdapter>> {
        Ok(self.adapter.clone())
    }
}
