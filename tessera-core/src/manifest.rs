//! Build and scenario manifests
//!
//! Source tree layout:
//!
//! ```text
//! <root>/build.json            {"<target>": ["stage", ...]}
//! <root>/<stage>.json          verbatim operations (no expansion)
//! <root>/<stage>/main.json     template operations
//! <root>/<stage>/test.json     ["scenario", ...]
//! <root>/<stage>/<scenario>/   user.json, prepare.json, yes.json, ...
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const BUILD_MANIFEST_FILE: &str = "build.json";
pub const SCENARIO_MANIFEST_FILE: &str = "test.json";
pub const MAIN_TEMPLATE_FILE: &str = "main.json";

/// Read and parse a JSON file.
pub fn read_json_file(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Like [`read_json_file`], but a missing file is `None`.
pub fn read_optional_json_file(path: &Path) -> Result<Option<Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    read_json_file(path).map(Some)
}

/// Stage and scenario names are single path components.
fn validate_component(field: &str, name: &str) -> Result<(), ConfigError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');
    if bad {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}' is not a valid directory name", name),
        });
    }
    Ok(())
}

// ============================================================================
// BUILD MANIFEST
// ============================================================================

/// `build.json`: build targets by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct BuildManifest {
    targets: BTreeMap<String, Vec<String>>,
}

impl BuildManifest {
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(BUILD_MANIFEST_FILE);
        let value = read_json_file(&path)?;
        let manifest: BuildManifest =
            serde_json::from_value(value).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (target, stages) in &self.targets {
            for stage in stages {
                validate_component(&format!("build target '{}'", target), stage)?;
            }
        }
        Ok(())
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn target(&self, name: &str) -> Result<BuildTarget, ConfigError> {
        self.targets
            .get(name)
            .map(|stages| BuildTarget {
                name: name.to_string(),
                stages: stages.clone(),
            })
            .ok_or_else(|| ConfigError::UnknownTarget {
                target: name.to_string(),
            })
    }
}

/// An ordered list of stages. Schema state accumulates along the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub name: String,
    pub stages: Vec<String>,
}

impl BuildTarget {
    /// Truncate the target after `stage` (inclusive).
    pub fn through(mut self, stage: &str) -> Result<Self, ConfigError> {
        let position = self
            .stages
            .iter()
            .position(|s| s == stage)
            .ok_or_else(|| ConfigError::UnknownStage {
                target: self.name.clone(),
                stage: stage.to_string(),
            })?;
        self.stages.truncate(position + 1);
        Ok(self)
    }

    pub fn stage_dir(root: &Path, stage: &str) -> PathBuf {
        root.join(stage)
    }
}

// ============================================================================
// SCENARIO MANIFEST
// ============================================================================

/// `test.json` of a stage: scenario directories in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScenarioManifest {
    pub scenarios: Vec<String>,
}

impl ScenarioManifest {
    /// Load a stage's scenario list; a stage without `test.json` has none.
    pub fn load(stage_dir: &Path) -> Result<Self, ConfigError> {
        let path = stage_dir.join(SCENARIO_MANIFEST_FILE);
        let Some(value) = read_optional_json_file(&path)? else {
            return Ok(Self::default());
        };
        let scenarios: Vec<String> =
            serde_json::from_value(value).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        for scenario in &scenarios {
            validate_component("scenario", scenario)?;
        }
        Ok(Self { scenarios })
    }
}
