//! Run configuration
//!
//! Loaded from a TOML file given by `--config` or `TESSERA_CONFIG`. All fields
//! are required unless explicitly marked optional.

use crate::error::ConfigError;
use crate::KeyDescriptor;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "TESSERA_CONFIG";

/// Keys of a committed transaction record that mark a failed transaction.
pub const DEFAULT_ERROR_MARKERS: [&str; 2] = ["_tx/error", "error"];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    pub ledger: LedgerSettings,
    pub root_key: KeyDescriptor,
    pub polling: PollSettings,
    pub markers: MarkerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerSettings {
    pub endpoint: String,
    pub network: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub notice_every: u32,
    /// Optional. Absent means wait for a commit indefinitely.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerSettings {
    pub transaction_error: Vec<String>,
}

impl LedgerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for MarkerSettings {
    fn default() -> Self {
        Self {
            transaction_error: DEFAULT_ERROR_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl HarnessConfig {
    /// Resolve the config path (explicit, then environment) and load it.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.endpoint.trim().is_empty() {
            return Err(invalid("ledger.endpoint", "must not be empty"));
        }
        if self.ledger.network.trim().is_empty() || self.ledger.network.contains('/') {
            return Err(invalid("ledger.network", "must be a non-empty name without '/'"));
        }
        if self.ledger.request_timeout_ms == 0 {
            return Err(invalid("ledger.request_timeout_ms", "must be greater than 0"));
        }
        if self.root_key.account_id.trim().is_empty() {
            return Err(invalid("root_key.account-id", "must not be empty"));
        }
        if self.polling.interval_ms == 0 {
            return Err(invalid("polling.interval_ms", "must be greater than 0"));
        }
        if self.polling.notice_every == 0 {
            return Err(invalid("polling.notice_every", "must be greater than 0"));
        }
        if self.polling.deadline_ms == Some(0) {
            return Err(invalid("polling.deadline_ms", "must be greater than 0 when set"));
        }
        if self.markers.transaction_error.is_empty() {
            return Err(invalid("markers.transaction_error", "must name at least one key"));
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.polling.interval_ms),
            notice_every: self.polling.notice_every,
            deadline: self.polling.deadline_ms.map(Duration::from_millis),
        }
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// How to wait for something the ledger commits eventually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between attempts.
    pub interval: Duration,
    /// Emit a "still waiting" notice every this many unsuccessful attempts.
    pub notice_every: u32,
    /// Give up after this long; `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            notice_every: 10,
            deadline: None,
        }
    }
}
