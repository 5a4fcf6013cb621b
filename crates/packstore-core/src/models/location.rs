//! Space and Location models.
//!
//! A Space is one configured backend instance (protocol plus connection
//! parameters); Locations are purposed sub-paths inside it. Packages
//! reference Locations, never Spaces directly.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Storage backend protocols.
///
/// Closed set: each variant selects one adapter implementation. Dispatch is
/// on this tag, never on runtime reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessProtocol {
    /// Synchronous local (or network-mounted) filesystem.
    Local,
    /// Tape-tiered appliance; content may be offline and need a recall.
    Tape,
    /// Replicated object store with checksummed HTTP transfer.
    Object,
}

impl FromStr for AccessProtocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(AccessProtocol::Local),
            "tape" => Ok(AccessProtocol::Tape),
            "object" => Ok(AccessProtocol::Object),
            _ => Err(anyhow::anyhow!("Invalid access protocol: {}", s)),
        }
    }
}

impl Display for AccessProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AccessProtocol::Local => write!(f, "local"),
            AccessProtocol::Tape => write!(f, "tape"),
            AccessProtocol::Object => write!(f, "object"),
        }
    }
}

/// Protocol-specific connection parameters, one variant per adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum SpaceConfig {
    Local {},
    Tape {
        /// Appliance host, e.g. "appliance.example.org:8443".
        host: String,
        /// Remote mount exposing recalled content locally.
        remote_mount: PathBuf,
    },
    Object {
        host: String,
        user: String,
        password: String,
        /// Named store ("duraspace") inside the service.
        store: String,
    },
}

impl SpaceConfig {
    pub fn protocol(&self) -> AccessProtocol {
        match self {
            SpaceConfig::Local {} => AccessProtocol::Local,
            SpaceConfig::Tape { .. } => AccessProtocol::Tape,
            SpaceConfig::Object { .. } => AccessProtocol::Object,
        }
    }
}

/// A configured backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub uuid: Uuid,
    /// Root path of this space on the backend.
    pub path: PathBuf,
    /// Local staging area used while moving bytes in or out.
    pub staging_path: PathBuf,
    pub config: SpaceConfig,
}

impl Space {
    pub fn access_protocol(&self) -> AccessProtocol {
        self.config.protocol()
    }
}

/// What a location is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPurpose {
    AipStorage,
    DipStorage,
    TransferSource,
    /// Storage-service internal staging.
    SsInternal,
}

/// A named destination inside a Space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub uuid: Uuid,
    pub purpose: LocationPurpose,
    /// Path relative to the owning space's root.
    pub relative_path: String,
    pub space: Uuid,
    pub description: Option<String>,
}

impl Location {
    /// Absolute path of this location, resolved against its space's root.
    pub fn full_path(&self, space: &Space) -> PathBuf {
        space.path.join(&self.relative_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_protocol_from_str() {
        assert_eq!(
            "local".parse::<AccessProtocol>().unwrap(),
            AccessProtocol::Local
        );
        assert_eq!(
            "TAPE".parse::<AccessProtocol>().unwrap(),
            AccessProtocol::Tape
        );
        assert!("ftp".parse::<AccessProtocol>().is_err());
    }

    #[test]
    fn test_full_path_resolution() {
        let space = Space {
            uuid: Uuid::new_v4(),
            path: PathBuf::from("/var/packstore"),
            staging_path: PathBuf::from("/var/packstore/staging"),
            config: SpaceConfig::Local {},
        };
        let location = Location {
            uuid: Uuid::new_v4(),
            purpose: LocationPurpose::AipStorage,
            relative_path: "aips".to_string(),
            space: space.uuid,
            description: None,
        };
        assert_eq!(
            location.full_path(&space),
            PathBuf::from("/var/packstore/aips")
        );
    }

    #[test]
    fn test_space_config_protocol_tag() {
        let cfg = SpaceConfig::Object {
            host: "store.example.org".into(),
            user: "u".into(),
            password: "p".into(),
            store: "archive".into(),
        };
        assert_eq!(cfg.protocol(), AccessProtocol::Object);
    }
}
