//! Engine configuration, read from `formgate.toml`.
//!
//! ```toml
//! [access]
//! permit_all_users = true
//!
//! [store]
//! path = ".formgate/forms.jsonl"
//! lock_wait_ms = 10000
//!
//! [uploads]
//! staging_dir = ".formgate/staging"
//! storage_dir = ".formgate/files"
//! timeout_ms = 5000
//! retries = 1
//!
//! [leases]
//! edit_ttl_seconds = 900
//! ```
//!
//! Every key is optional; a missing file yields the defaults.

use formgate_kernel::AccessPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "formgate.toml";
pub const DEFAULT_STORE_PATH: &str = ".formgate/forms.jsonl";
pub const DEFAULT_LOCK_WAIT_MS: u64 = 10_000;
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 5000;
/// Upload resolution is retried at most once.
pub const MAX_UPLOAD_RETRIES: u32 = 1;
pub const DEFAULT_EDIT_LEASE_TTL_SECONDS: i64 = 900;
pub const MIN_EDIT_LEASE_TTL_SECONDS: i64 = 30;
pub const MAX_EDIT_LEASE_TTL_SECONDS: i64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(
        "leases.edit_ttl_seconds must be in range [{min}, {max}] (got {actual})",
        min = MIN_EDIT_LEASE_TTL_SECONDS,
        max = MAX_EDIT_LEASE_TTL_SECONDS
    )]
    InvalidLeaseTtl { actual: i64 },

    #[error("uploads.timeout_ms must be positive")]
    InvalidUploadTimeout,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub access: AccessConfig,
    pub store: StoreConfig,
    pub uploads: UploadConfig,
    pub leases: LeaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Installation-wide "permit all users" policy.
    pub permit_all_users: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            permit_all_users: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// How long a writer waits for the store lock before giving up.
    pub lock_wait_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            lock_wait_ms: DEFAULT_LOCK_WAIT_MS,
        }
    }
}

impl StoreConfig {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub staging_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from(".formgate/staging"),
            storage_dir: PathBuf::from(".formgate/files"),
            timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
            retries: MAX_UPLOAD_RETRIES,
        }
    }
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Configured retries, capped at one.
    pub fn effective_retries(&self) -> u32 {
        self.retries.min(MAX_UPLOAD_RETRIES)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub edit_ttl_seconds: i64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            edit_ttl_seconds: DEFAULT_EDIT_LEASE_TTL_SECONDS,
        }
    }
}

impl EngineConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    message: err.to_string(),
                });
            }
        };
        Self::parse(&text, path)
    }

    /// Parse TOML text; `origin` only labels errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text).map_err(|source| ConfigError::ParseToml {
            path: origin.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ttl = self.leases.edit_ttl_seconds;
        if !(MIN_EDIT_LEASE_TTL_SECONDS..=MAX_EDIT_LEASE_TTL_SECONDS).contains(&ttl) {
            return Err(ConfigError::InvalidLeaseTtl { actual: ttl });
        }
        if self.uploads.timeout_ms == 0 {
            return Err(ConfigError::InvalidUploadTimeout);
        }
        Ok(())
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            allow_permit_all: self.access.permit_all_users,
        }
    }
}
