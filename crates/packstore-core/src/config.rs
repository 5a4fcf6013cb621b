//! Configuration module
//!
//! Environment-driven service configuration. The resolver and adapters
//! receive this object explicitly at construction; nothing reads process
//! settings ad hoc at call time.

use std::env;
use std::path::PathBuf;

const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 120;

/// Service configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Scratch area for decompression and transient extraction.
    pub staging_path: PathBuf,
    /// Service account applied to newly placed local AIP trees. `None`
    /// skips ownership normalization entirely.
    pub service_account: Option<ServiceAccount>,
    /// Timeout applied to remote backend HTTP calls.
    pub backend_timeout_secs: u64,
}

/// Owning user/group applied to imported trees on local filesystems.
#[derive(Clone, Copy, Debug)]
pub struct ServiceAccount {
    pub uid: u32,
    pub gid: u32,
}

impl Config {
    /// Build configuration from environment variables (.env honored).
    ///
    /// `PACKSTORE_STAGING_PATH` defaults to a packstore directory under the
    /// system temp dir; `PACKSTORE_SERVICE_UID`/`PACKSTORE_SERVICE_GID`
    /// must be set together or not at all.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let staging_path = env::var("PACKSTORE_STAGING_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("packstore-staging"));

        let uid = env::var("PACKSTORE_SERVICE_UID").ok();
        let gid = env::var("PACKSTORE_SERVICE_GID").ok();
        let service_account = match (uid, gid) {
            (Some(uid), Some(gid)) => Some(ServiceAccount {
                uid: uid.parse()?,
                gid: gid.parse()?,
            }),
            (None, None) => None,
            _ => {
                return Err(anyhow::anyhow!(
                    "PACKSTORE_SERVICE_UID and PACKSTORE_SERVICE_GID must be set together"
                ))
            }
        };

        let backend_timeout_secs = env::var("PACKSTORE_BACKEND_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS);

        Ok(Config {
            staging_path,
            service_account,
            backend_timeout_secs,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            staging_path: env::temp_dir().join("packstore-staging"),
            service_account: None,
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
        }
    }
}
