//! Packstore core library
//!
//! Domain models, error taxonomy and configuration for the packstore
//! archival storage service. The persistence layer and HTTP surface are
//! external collaborators; this crate defines the traits they implement
//! (`RecordStore`, `SettingsStore`) together with in-memory versions used
//! by tests and embedded deployments.

pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::event::{AgentRef, ProvenanceEvent};
pub use models::location::{AccessProtocol, Location, LocationPurpose, Space, SpaceConfig};
pub use models::package::{Compression, Package, PackageStatus, PackageType, TieredAttributes};
pub use models::pipeline::Pipeline;
pub use store::{
    MemoryRecordStore, MemorySettings, RecordStore, SettingsStore, StoreError, StoreResult,
};

/// Name of the setting holding the default AIP storage location UUID.
pub const DEFAULT_AIP_LOCATION_SETTING: &str = "default_aip_location";
