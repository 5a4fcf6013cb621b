//! Record-store and settings interfaces.
//!
//! The real persistence layer (ORM, migrations) lives outside this
//! workspace; the service core only depends on these traits. The in-memory
//! implementations back the test suites and embedded single-process
//! deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::models::{Location, Package, Pipeline, Space};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Duplicate primary key on save.
    #[error("A record with UUID {0} already exists")]
    UniquenessViolation(Uuid),

    #[error("{0}")]
    NotFound(String),

    #[error("Record store error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Record store for packages, locations, spaces and pipelines.
///
/// `save_package` inserts and must raise `UniquenessViolation` on a
/// duplicate primary key; `update_package` mutates an existing record.
/// Mutations on a single package UUID are serialized by the caller.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_package(&self, uuid: Uuid) -> StoreResult<Option<Package>>;

    /// The non-deleted package holding this UUID, if any.
    async fn active_package(&self, uuid: Uuid) -> StoreResult<Option<Package>>;

    async fn save_package(&self, package: &Package) -> StoreResult<()>;

    async fn update_package(&self, package: &Package) -> StoreResult<()>;

    /// Remove the record entirely (used by confirmed replacement).
    async fn delete_package(&self, uuid: Uuid) -> StoreResult<()>;

    async fn get_location(&self, uuid: Uuid) -> StoreResult<Option<Location>>;

    async fn get_space(&self, uuid: Uuid) -> StoreResult<Option<Space>>;

    async fn get_pipeline(&self, uuid: Uuid) -> StoreResult<Option<Pipeline>>;

    /// An arbitrary existing pipeline, used as the import fallback origin.
    async fn any_pipeline(&self) -> StoreResult<Option<Pipeline>>;
}

/// Key/value settings lookup, e.g. the default AIP location indirection.
pub trait SettingsStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// In-memory record store for tests and embedded use.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    packages: Arc<Mutex<HashMap<Uuid, Package>>>,
    locations: Arc<Mutex<HashMap<Uuid, Location>>>,
    spaces: Arc<Mutex<HashMap<Uuid, Space>>>,
    pipelines: Arc<Mutex<HashMap<Uuid, Pipeline>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_location(&self, location: Location) {
        self.locations
            .lock()
            .expect("locations lock")
            .insert(location.uuid, location);
    }

    pub fn add_space(&self, space: Space) {
        self.spaces
            .lock()
            .expect("spaces lock")
            .insert(space.uuid, space);
    }

    pub fn add_pipeline(&self, pipeline: Pipeline) {
        self.pipelines
            .lock()
            .expect("pipelines lock")
            .insert(pipeline.uuid, pipeline);
    }

    pub fn package_count(&self) -> usize {
        self.packages.lock().expect("packages lock").len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_package(&self, uuid: Uuid) -> StoreResult<Option<Package>> {
        Ok(self
            .packages
            .lock()
            .expect("packages lock")
            .get(&uuid)
            .cloned())
    }

    async fn active_package(&self, uuid: Uuid) -> StoreResult<Option<Package>> {
        Ok(self
            .packages
            .lock()
            .expect("packages lock")
            .get(&uuid)
            .filter(|p| p.is_active())
            .cloned())
    }

    async fn save_package(&self, package: &Package) -> StoreResult<()> {
        let mut packages = self.packages.lock().expect("packages lock");
        if packages.contains_key(&package.uuid) {
            return Err(StoreError::UniquenessViolation(package.uuid));
        }
        packages.insert(package.uuid, package.clone());
        Ok(())
    }

    async fn update_package(&self, package: &Package) -> StoreResult<()> {
        let mut packages = self.packages.lock().expect("packages lock");
        if !packages.contains_key(&package.uuid) {
            return Err(StoreError::NotFound(format!(
                "No package with UUID {}",
                package.uuid
            )));
        }
        packages.insert(package.uuid, package.clone());
        Ok(())
    }

    async fn delete_package(&self, uuid: Uuid) -> StoreResult<()> {
        self.packages.lock().expect("packages lock").remove(&uuid);
        Ok(())
    }

    async fn get_location(&self, uuid: Uuid) -> StoreResult<Option<Location>> {
        Ok(self
            .locations
            .lock()
            .expect("locations lock")
            .get(&uuid)
            .cloned())
    }

    async fn get_space(&self, uuid: Uuid) -> StoreResult<Option<Space>> {
        Ok(self
            .spaces
            .lock()
            .expect("spaces lock")
            .get(&uuid)
            .cloned())
    }

    async fn get_pipeline(&self, uuid: Uuid) -> StoreResult<Option<Pipeline>> {
        Ok(self
            .pipelines
            .lock()
            .expect("pipelines lock")
            .get(&uuid)
            .cloned())
    }

    async fn any_pipeline(&self) -> StoreResult<Option<Pipeline>> {
        Ok(self
            .pipelines
            .lock()
            .expect("pipelines lock")
            .values()
            .next()
            .cloned())
    }
}

/// In-memory settings store.
#[derive(Clone, Default)]
pub struct MemorySettings {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, value: &str) {
        self.values
            .lock()
            .expect("settings lock")
            .insert(name.to_string(), value.to_string());
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, name: &str) -> Option<String> {
        self.values.lock().expect("settings lock").get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PackageStatus, PackageType};

    fn package(uuid: Uuid) -> Package {
        Package::new(uuid, PackageType::Aip, Uuid::new_v4(), "a/b".to_string())
    }

    #[tokio::test]
    async fn test_save_raises_uniqueness_violation() {
        let store = MemoryRecordStore::new();
        let uuid = Uuid::new_v4();
        store.save_package(&package(uuid)).await.unwrap();

        let err = store.save_package(&package(uuid)).await.unwrap_err();
        assert!(matches!(err, StoreError::UniquenessViolation(u) if u == uuid));
    }

    #[tokio::test]
    async fn test_active_package_excludes_deleted() {
        let store = MemoryRecordStore::new();
        let uuid = Uuid::new_v4();
        let mut p = package(uuid);
        store.save_package(&p).await.unwrap();
        assert!(store.active_package(uuid).await.unwrap().is_some());

        p.status = PackageStatus::Deleted;
        store.update_package(&p).await.unwrap();
        assert!(store.active_package(uuid).await.unwrap().is_none());
        // The record itself is still there.
        assert!(store.get_package(uuid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_requires_existing_record() {
        let store = MemoryRecordStore::new();
        let err = store.update_package(&package(Uuid::new_v4())).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_settings_roundtrip() {
        let settings = MemorySettings::new();
        assert!(settings.get("default_aip_location").is_none());
        settings.set("default_aip_location", "abc");
        assert_eq!(settings.get("default_aip_location").as_deref(), Some("abc"));
    }
}
