//! Build Assembler
//!
//! Resolves each stage of a build target to its final operations and
//! concatenates them into the cumulative artifact.

use crate::compiler::canonical::{to_canonical_pretty, to_canonical_string};
use crate::compiler::{expand_transaction, TemplateContext};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tessera_core::manifest::MAIN_TEMPLATE_FILE;
use tessera_core::{parse_transaction, transaction_to_value, TemplateError, Transaction};

/// The final operations contributed by one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageArtifact {
    pub stage: String,
    pub operations: Transaction,
}

impl StageArtifact {
    pub fn to_value(&self) -> Value {
        transaction_to_value(&self.operations)
    }
}

pub struct BuildAssembler {
    root: PathBuf,
}

impl BuildAssembler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve one stage.
    ///
    /// `<stage>.json` wins and is used without expansion; otherwise
    /// `<stage>/main.json` is expanded with the stage directory as the
    /// component directory.
    pub fn assemble_stage(&self, stage: &str) -> Result<StageArtifact, TemplateError> {
        let verbatim = self.root.join(format!("{}.json", stage));
        if verbatim.is_file() {
            tracing::debug!(stage, path = %verbatim.display(), "Using no-expand stage file");
            let operations = parse_transaction(read_document(&verbatim)?)?;
            return Ok(StageArtifact {
                stage: stage.to_string(),
                operations,
            });
        }

        let stage_dir = self.root.join(stage);
        let main = stage_dir.join(MAIN_TEMPLATE_FILE);
        if !main.is_file() {
            return Err(TemplateError::Resolution {
                path: main,
                reason: format!("neither {}.json nor {}/{} exists", stage, stage, MAIN_TEMPLATE_FILE),
            });
        }

        let templates = parse_transaction(read_document(&main)?)?;
        let operations = expand_transaction(templates, &TemplateContext::new(stage_dir))?;
        tracing::debug!(stage, operations = operations.len(), "Expanded stage templates");
        Ok(StageArtifact {
            stage: stage.to_string(),
            operations,
        })
    }

    /// Resolve every stage in order.
    pub fn assemble(&self, stages: &[String]) -> Result<Vec<StageArtifact>, TemplateError> {
        stages.iter().map(|stage| self.assemble_stage(stage)).collect()
    }
}

fn read_document(path: &Path) -> Result<Value, TemplateError> {
    let text = std::fs::read_to_string(path).map_err(|e| TemplateError::Resolution {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| TemplateError::Resolution {
        path: path.to_path_buf(),
        reason: format!("malformed document: {}", e),
    })
}

// ============================================================================
// ARTIFACT OUTPUT
// ============================================================================

/// Flat operation list across stages, in stage order.
pub fn flatten(artifacts: &[StageArtifact]) -> Transaction {
    artifacts
        .iter()
        .flat_map(|artifact| artifact.operations.iter().cloned())
        .collect()
}

/// The deployable artifact document (pretty-printed JSON).
pub fn render_artifact(artifacts: &[StageArtifact]) -> String {
    to_canonical_pretty(&transaction_to_value(&flatten(artifacts)))
}

/// SHA-256 of the compact canonical artifact, hex-encoded. Stable across
/// rebuilds of the same sources.
pub fn artifact_digest(artifacts: &[StageArtifact]) -> String {
    let compact = to_canonical_string(&transaction_to_value(&flatten(artifacts)));
    let mut hasher = Sha256::new();
    hasher.update(compact.as_bytes());
    hex::encode(hasher.finalize())
}
