//! Tessera Core - Shared Types
//!
//! Data types shared by every Tessera crate: the operation model, key
//! descriptors and role tables, build/scenario manifests, run configuration
//! and the error taxonomy. This crate does no network I/O; the only side
//! effects are the manifest and config file reads.

pub mod config;
pub mod error;
pub mod keys;
pub mod manifest;
pub mod operation;
pub mod phase;

pub use config::{
    HarnessConfig, LedgerSettings, MarkerSettings, PollPolicy, PollSettings,
    DEFAULT_ERROR_MARKERS,
};
pub use error::{
    ConfigError, LedgerError, ScenarioError, TemplateError, TesseraError, TesseraResult,
};
pub use keys::{KeyDescriptor, RoleSets};
pub use manifest::{BuildManifest, BuildTarget, ScenarioManifest};
pub use operation::{
    parse_transaction, strip_comments, transaction_to_value, CodeSource, Operation,
    Transaction,
};
pub use phase::Phase;

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Identifier the ledger assigns to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully qualified database name: `<network>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseId(String);

impl DatabaseId {
    pub fn new(network: &str, name: &str) -> Self {
        Self(format!("{}/{}", network, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Network part of the id (everything before the first `/`).
    pub fn network(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
