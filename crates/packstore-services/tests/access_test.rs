//! Access-layer tests: whole-package downloads, single-file extraction,
//! and the pending/error split for tiered backends.

use bytes::Bytes;
use futures::StreamExt;
use packstore_core::models::{
    Location, LocationPurpose, Package, PackageType, Space, SpaceConfig, TieredAttributes,
};
use packstore_core::{AppError, Config, ErrorMetadata, MemoryRecordStore, MemorySettings, RecordStore};
use packstore_services::access::{Fetch, PackageAccessService};
use packstore_services::test_helpers::{write_test_bag, zip_bag, FixedAdapterFactory, StubAdapter};
use packstore_storage::factory::{AdapterFactory, DefaultAdapterFactory};
use packstore_storage::paths::uuid_to_path;
use packstore_storage::resolver::LocationResolver;
use packstore_storage::traits::StorageError;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

struct Harness {
    _root: tempfile::TempDir,
    store: Arc<MemoryRecordStore>,
    service: PackageAccessService,
    location_uuid: Uuid,
    location_root: PathBuf,
    source_root: PathBuf,
}

fn harness_with_factory(factory: Arc<dyn AdapterFactory>) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let root = tempfile::tempdir().expect("tempdir");
    let space_path = root.path().join("space");
    let staging = root.path().join("staging");
    let source_root = root.path().join("sources");
    std::fs::create_dir_all(space_path.join("aips")).expect("space dirs");
    std::fs::create_dir_all(&staging).expect("staging dir");
    std::fs::create_dir_all(&source_root).expect("source dir");

    let space = Space {
        uuid: Uuid::new_v4(),
        path: space_path.clone(),
        staging_path: staging.clone(),
        config: SpaceConfig::Local {},
    };
    let location = Location {
        uuid: Uuid::new_v4(),
        purpose: LocationPurpose::AipStorage,
        relative_path: "aips".to_string(),
        space: space.uuid,
        description: None,
    };
    let location_uuid = location.uuid;
    let location_root = space_path.join("aips");

    let store = Arc::new(MemoryRecordStore::new());
    store.add_space(space);
    store.add_location(location);

    let config = Config {
        staging_path: staging,
        service_account: None,
        backend_timeout_secs: 120,
    };
    let store_dyn: Arc<dyn RecordStore> = store.clone();
    let settings: Arc<dyn packstore_core::SettingsStore> = Arc::new(MemorySettings::new());
    let resolver = LocationResolver::new(store_dyn.clone(), settings);
    let service = PackageAccessService::new(store_dyn, resolver, factory, config);

    Harness {
        _root: root,
        store,
        service,
        location_uuid,
        location_root,
        source_root,
    }
}

fn harness() -> Harness {
    let config = Config {
        staging_path: std::env::temp_dir(),
        service_account: None,
        backend_timeout_secs: 120,
    };
    harness_with_factory(Arc::new(DefaultAdapterFactory::new(config)))
}

async fn collect(mut stream: packstore_services::access::ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk.expect("stream chunk");
        out.extend_from_slice(&chunk);
    }
    out
}

/// Store an uncompressed bag under the location and register its package.
async fn store_uncompressed(h: &Harness, name: &str, uuid: Uuid) -> Package {
    let bag = write_test_bag(&h.source_root, name, uuid).await;
    let relative = uuid_to_path(uuid).join(name);
    let destination = h.location_root.join(&relative);
    std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
    copy_tree(&bag, &destination);

    let mut package = Package::new(
        uuid,
        PackageType::Aip,
        h.location_uuid,
        relative.to_string_lossy().to_string(),
    );
    package.size = 4;
    h.store.save_package(&package).await.unwrap();
    package
}

/// Store a zipped bag under the location and register its package.
async fn store_zipped(h: &Harness, name: &str, uuid: Uuid) -> Package {
    let bag = write_test_bag(&h.source_root, name, uuid).await;
    let relative = uuid_to_path(uuid).join(format!("{name}.zip"));
    let destination = h.location_root.join(&relative);
    std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
    zip_bag(&bag, &destination);

    let package = Package::new(
        uuid,
        PackageType::Aip,
        h.location_uuid,
        relative.to_string_lossy().to_string(),
    );
    h.store.save_package(&package).await.unwrap();
    package
}

fn copy_tree(from: &std::path::Path, to: &std::path::Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
}

#[tokio::test]
async fn test_compressed_package_streams_as_is() {
    let h = harness();
    let uuid = Uuid::new_v4();
    store_zipped(&h, "working_bag", uuid).await;

    let fetch = h.service.fetch(uuid, None).await.unwrap();
    let Fetch::Delivered {
        stream,
        content_type,
        filename,
        size,
    } = fetch
    else {
        panic!("expected delivery");
    };
    assert_eq!(content_type, "application/zip");
    assert_eq!(filename, "working_bag.zip");

    let bytes = collect(stream).await;
    assert_eq!(Some(bytes.len() as u64), size);
    // The body is the stored archive, byte for byte.
    let stored = h
        .location_root
        .join(uuid_to_path(uuid))
        .join("working_bag.zip");
    assert_eq!(bytes, std::fs::read(stored).unwrap());
}

#[tokio::test]
async fn test_uncompressed_package_synthesizes_tar() {
    let h = harness();
    let uuid = Uuid::new_v4();
    store_uncompressed(&h, "working_bag", uuid).await;

    let fetch = h.service.fetch(uuid, None).await.unwrap();
    let Fetch::Delivered {
        stream,
        content_type,
        filename,
        size,
    } = fetch
    else {
        panic!("expected delivery");
    };
    assert_eq!(content_type, "application/x-tar");
    assert_eq!(filename, "working_bag.tar");
    assert_eq!(size, None);

    let bytes = collect(stream).await;
    let mut archive = tar::Archive::new(std::io::Cursor::new(bytes));
    let names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
        .collect();
    for expected in [
        "working_bag/bagit.txt",
        "working_bag/bag-info.txt",
        "working_bag/manifest-md5.txt",
        "working_bag/tagmanifest-md5.txt",
        "working_bag/data/test.txt",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
}

#[tokio::test]
async fn test_single_file_from_uncompressed_tree() {
    let h = harness();
    let uuid = Uuid::new_v4();
    store_uncompressed(&h, "working_bag", uuid).await;

    let fetch = h
        .service
        .fetch(uuid, Some("working_bag/data/test.txt"))
        .await
        .unwrap();
    let Fetch::Delivered {
        stream,
        content_type,
        filename,
        size,
    } = fetch
    else {
        panic!("expected delivery");
    };
    assert_eq!(content_type, "text/plain");
    assert_eq!(filename, "test.txt");
    assert_eq!(size, Some(4));
    assert_eq!(collect(stream).await, b"test");
}

#[tokio::test]
async fn test_single_file_extraction_parity_across_representations() {
    let h = harness();
    let zipped_uuid = Uuid::new_v4();
    let loose_uuid = Uuid::new_v4();
    store_zipped(&h, "working_bag", zipped_uuid).await;
    store_uncompressed(&h, "working_bag", loose_uuid).await;

    let member = "working_bag/data/test.txt";
    let mut bodies = Vec::new();
    for uuid in [zipped_uuid, loose_uuid] {
        let fetch = h.service.fetch(uuid, Some(member)).await.unwrap();
        let Fetch::Delivered { stream, .. } = fetch else {
            panic!("expected delivery");
        };
        bodies.push(collect(stream).await);
    }
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn test_missing_member_is_not_found() {
    let h = harness();
    let uuid = Uuid::new_v4();
    store_zipped(&h, "working_bag", uuid).await;

    let err = h
        .service
        .fetch(uuid, Some("working_bag/data/absent.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(err.http_status_code(), 404);
}

#[tokio::test]
async fn test_empty_relative_path_is_invalid_input() {
    let h = harness();
    let uuid = Uuid::new_v4();
    store_zipped(&h, "working_bag", uuid).await;

    let err = h.service.fetch(uuid, Some("")).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(err.http_status_code(), 400);
}

#[tokio::test]
async fn test_unknown_package_is_not_found() {
    let h = harness();
    let err = h.service.fetch(Uuid::new_v4(), None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_traversal_member_path_is_rejected() {
    let h = harness();
    let uuid = Uuid::new_v4();
    store_uncompressed(&h, "working_bag", uuid).await;

    let err = h
        .service
        .fetch(uuid, Some("../outside.txt"))
        .await
        .unwrap_err();
    assert_eq!(err.http_status_code(), 400);
}

#[tokio::test]
async fn test_non_resident_tiered_content_is_pending_not_error() {
    let adapter = Arc::new(StubAdapter::recalling("recall-1"));
    let factory = Arc::new(FixedAdapterFactory::new(adapter.clone()));
    let h = harness_with_factory(factory);
    let uuid = Uuid::new_v4();
    store_zipped(&h, "working_bag", uuid).await;

    let fetch = h.service.fetch(uuid, None).await.unwrap();
    let Fetch::Pending { message } = fetch else {
        panic!("expected pending");
    };
    assert!(message.contains("not locally available"));
    assert_eq!(adapter.move_to_calls(), 1);

    // The recall token was persisted; fetching again does not re-request.
    let saved = h.store.get_package(uuid).await.unwrap().unwrap();
    assert_eq!(
        saved.tiered,
        Some(TieredAttributes {
            recall_request_id: Some("recall-1".to_string())
        })
    );
    let fetch = h.service.fetch(uuid, None).await.unwrap();
    assert!(matches!(fetch, Fetch::Pending { .. }));
    assert_eq!(adapter.move_to_calls(), 1);
}

#[tokio::test]
async fn test_backend_recall_failure_is_a_backend_error() {
    let adapter = Arc::new(StubAdapter::failing(|| {
        StorageError::Backend("replication state red".to_string())
    }));
    let factory = Arc::new(FixedAdapterFactory::new(adapter));
    let h = harness_with_factory(factory);
    let uuid = Uuid::new_v4();
    store_zipped(&h, "working_bag", uuid).await;

    let err = h.service.fetch(uuid, None).await.unwrap_err();
    assert!(matches!(err, AppError::Backend(_)));
    assert_eq!(err.http_status_code(), 502);
}
