//! Adapter construction from Space configuration.

use crate::local::LocalFilesystemAdapter;
use crate::object::ReplicatedObjectAdapter;
use crate::tape::TieredTapeAdapter;
use crate::traits::{StorageAdapter, StorageResult};
use packstore_core::models::{Space, SpaceConfig};
use packstore_core::Config;
use std::sync::Arc;

/// Seam for services that need an adapter per space. The default
/// implementation dispatches on the space's protocol tag; tests substitute
/// stub adapters here.
pub trait AdapterFactory: Send + Sync {
    fn adapter_for(&self, space: &Space) -> StorageResult<Arc<dyn StorageAdapter>>;
}

/// Factory backed by the real backend implementations.
pub struct DefaultAdapterFactory {
    config: Config,
}

impl DefaultAdapterFactory {
    pub fn new(config: Config) -> Self {
        DefaultAdapterFactory { config }
    }
}

impl AdapterFactory for DefaultAdapterFactory {
    fn adapter_for(&self, space: &Space) -> StorageResult<Arc<dyn StorageAdapter>> {
        create_adapter(space, &self.config)
    }
}

/// Create the adapter serving a space, dispatching on its protocol tag.
pub fn create_adapter(space: &Space, config: &Config) -> StorageResult<Arc<dyn StorageAdapter>> {
    match &space.config {
        SpaceConfig::Local {} => Ok(Arc::new(LocalFilesystemAdapter::new(
            config.service_account,
        ))),
        SpaceConfig::Tape { host, remote_mount } => Ok(Arc::new(TieredTapeAdapter::new(
            host.clone(),
            remote_mount.clone(),
            config.backend_timeout_secs,
        )?)),
        SpaceConfig::Object {
            host,
            user,
            password,
            store,
        } => Ok(Arc::new(ReplicatedObjectAdapter::new(
            host.clone(),
            user.clone(),
            password.clone(),
            store.clone(),
            config.backend_timeout_secs,
        )?)),
    }
}
