//! Key descriptors and per-scenario role tables
//!
//! A scenario's `user.json` lists signing keys and names which of them act in
//! each phase:
//!
//! ```json
//! {"keys": [{"private": "...", "account-id": "..."}],
//!  "yes": 0, "no": [0, 1], "tyes": [], "tno": 1}
//! ```
//!
//! A role set is either one index or a list of indices. Both shapes are
//! resolved here into an ordered list of keys so the runner never looks at
//! indices.

use crate::error::{ScenarioError, TesseraError};
use crate::manifest::read_json_file;
use crate::operation::{strip_comments, COMMENT_KEY};
use crate::Phase;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

pub const ROLE_TABLE_FILE: &str = "user.json";

/// Signing credential plus the network identity derived from it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyDescriptor {
    pub private: String,
    #[serde(rename = "account-id")]
    pub account_id: String,
}

impl KeyDescriptor {
    pub fn new(private: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            private: private.into(),
            account_id: account_id.into(),
        }
    }
}

// Private keys never reach logs.
impl fmt::Debug for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDescriptor")
            .field("private", &"<redacted>")
            .field("account_id", &self.account_id)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoleIndices {
    One(usize),
    Many(Vec<usize>),
}

impl RoleIndices {
    fn into_vec(self) -> Vec<usize> {
        match self {
            RoleIndices::One(index) => vec![index],
            RoleIndices::Many(indices) => indices,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoleTableFile {
    keys: Vec<KeyDescriptor>,
    #[serde(default)]
    yes: Option<RoleIndices>,
    #[serde(default)]
    no: Option<RoleIndices>,
    #[serde(default)]
    tyes: Option<RoleIndices>,
    #[serde(default)]
    tno: Option<RoleIndices>,
}

/// Resolved role table: one ordered key list per non-privileged phase.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleSets {
    pub yes: Vec<KeyDescriptor>,
    pub no: Vec<KeyDescriptor>,
    pub tyes: Vec<KeyDescriptor>,
    pub tno: Vec<KeyDescriptor>,
}

impl RoleSets {
    /// Load and resolve `user.json` from a scenario directory. Errors name
    /// the scenario by its directory name.
    pub fn load(scenario_dir: &Path) -> Result<Self, TesseraError> {
        let path = scenario_dir.join(ROLE_TABLE_FILE);
        let scenario = scenario_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| scenario_dir.display().to_string());
        Self::from_value(&scenario, &path, read_json_file(&path)?)
    }

    /// Resolve a role table given as a JSON string.
    pub fn from_json(scenario: &str, text: &str) -> Result<Self, TesseraError> {
        let value: Value = serde_json::from_str(text).map_err(|e| crate::ConfigError::Parse {
            path: ROLE_TABLE_FILE.into(),
            reason: e.to_string(),
        })?;
        Self::from_value(scenario, Path::new(ROLE_TABLE_FILE), value)
    }

    fn from_value(scenario: &str, path: &Path, value: Value) -> Result<Self, TesseraError> {
        let table: RoleTableFile =
            serde_json::from_value(strip_key_comments(value)).map_err(|e| {
                crate::ConfigError::Parse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;
        Ok(Self::resolve(scenario, table)?)
    }

    fn resolve(scenario: &str, table: RoleTableFile) -> Result<Self, ScenarioError> {
        let keys = &table.keys;
        Ok(Self {
            yes: pick(scenario, keys, "yes", table.yes)?,
            no: pick(scenario, keys, "no", table.no)?,
            tyes: pick(scenario, keys, "tyes", table.tyes)?,
            tno: pick(scenario, keys, "tno", table.tno)?,
        })
    }

    /// Keys acting in `phase`; empty for the privileged phases.
    pub fn for_phase(&self, phase: Phase) -> &[KeyDescriptor] {
        match phase {
            Phase::YesQuery => &self.yes,
            Phase::NoQuery => &self.no,
            Phase::YesTransaction => &self.tyes,
            Phase::NoTransaction => &self.tno,
            Phase::Prepare | Phase::Cleanup => &[],
        }
    }
}

/// `COMMENT` is allowed on the table and on each key entry.
fn strip_key_comments(value: Value) -> Value {
    match value {
        Value::Object(mut table) => {
            table.remove(COMMENT_KEY);
            if let Some(keys) = table.get_mut("keys") {
                *keys = strip_comments(keys);
            }
            Value::Object(table)
        }
        other => other,
    }
}

fn pick(
    scenario: &str,
    keys: &[KeyDescriptor],
    set: &str,
    indices: Option<RoleIndices>,
) -> Result<Vec<KeyDescriptor>, ScenarioError> {
    indices
        .map(RoleIndices::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(|index| {
            keys.get(index)
                .cloned()
                .ok_or_else(|| ScenarioError::RoleIndexOutOfRange {
                    scenario: scenario.to_string(),
                    set: set.to_string(),
                    index,
                    keys: keys.len(),
                })
        })
        .collect()
}
