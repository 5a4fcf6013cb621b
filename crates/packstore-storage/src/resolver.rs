//! Location/Space resolution.
//!
//! Maps a logical location identifier to its Space and absolute root
//! path. The "default" identifier indirects through the settings store so
//! installations can repoint the default AIP destination without touching
//! callers. Settings are injected at construction, never read ambiently.

use packstore_core::models::{Location, Space};
use packstore_core::{AppError, RecordStore, SettingsStore, DEFAULT_AIP_LOCATION_SETTING};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// A location reference accepted by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationId {
    Uuid(Uuid),
    /// Resolve through the default-AIP-location setting.
    Default,
}

impl FromStr for LocationId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "default" {
            return Ok(LocationId::Default);
        }
        Ok(LocationId::Uuid(Uuid::parse_str(s)?))
    }
}

/// A resolved location: the Location record, its Space, and the absolute
/// path packages under it live beneath.
#[derive(Debug, Clone)]
pub struct ResolvedLocation {
    pub location: Location,
    pub space: Space,
    pub full_path: PathBuf,
}

pub struct LocationResolver {
    store: Arc<dyn RecordStore>,
    settings: Arc<dyn SettingsStore>,
}

impl LocationResolver {
    pub fn new(store: Arc<dyn RecordStore>, settings: Arc<dyn SettingsStore>) -> Self {
        LocationResolver { store, settings }
    }

    pub async fn resolve(&self, id: LocationId) -> Result<ResolvedLocation, AppError> {
        let uuid = match id {
            LocationId::Uuid(uuid) => uuid,
            LocationId::Default => {
                let value = self
                    .settings
                    .get(DEFAULT_AIP_LOCATION_SETTING)
                    .ok_or_else(|| {
                        AppError::NotFound(format!(
                            "No {} setting is configured",
                            DEFAULT_AIP_LOCATION_SETTING
                        ))
                    })?;
                Uuid::parse_str(&value).map_err(|e| {
                    AppError::Internal(format!(
                        "Setting {} holds an invalid UUID: {}",
                        DEFAULT_AIP_LOCATION_SETTING, e
                    ))
                })?
            }
        };

        let location = self
            .store
            .get_location(uuid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No storage location matching {}", uuid)))?;
        let space = self.store.get_space(location.space).await?.ok_or_else(|| {
            AppError::NotFound(format!(
                "Location {} references missing space {}",
                uuid, location.space
            ))
        })?;

        let full_path = location.full_path(&space);
        tracing::debug!(
            location_uuid = %location.uuid,
            space_uuid = %space.uuid,
            full_path = %full_path.display(),
            "Resolved storage location"
        );
        Ok(ResolvedLocation {
            location,
            space,
            full_path,
        })
    }
}
