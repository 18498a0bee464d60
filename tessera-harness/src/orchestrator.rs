//! Orchestrator
//!
//! Drives a build target stage by stage. For stage N under test:
//!
//! ```text
//! assemble stages 0..=N
//!     ↓
//! create <network>/<stage>-<suffix>
//!     ↓
//! one privileged transaction per assembled stage, in order
//!     ↓
//! every scenario in <stage>/test.json
//! ```
//!
//! All sources and scenario files are loaded before the first network call,
//! so a broken tree fails without touching the ledger.

use crate::context::RunContext;
use crate::monitor::error_marker;
use crate::scenario::{ScenarioPlan, ScenarioReport, ScenarioRunner};
use std::path::Path;
use tessera_core::{
    BuildTarget, DatabaseId, ScenarioManifest, TesseraError, TesseraResult,
};
use tessera_ledger::{wait_until_ready, LedgerClient, LedgerConnection};
use tessera_template::{
    artifact_digest, render_artifact, to_canonical_string, BuildAssembler, StageArtifact,
};
use uuid::Uuid;

/// Outcome of a deploy or test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: String,
    pub database: DatabaseId,
    pub scenarios: Vec<ScenarioReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn scenario_count(&self) -> usize {
        self.stages.iter().map(|s| s.scenarios.len()).sum()
    }
}

// ============================================================================
// COMPILE (no ledger)
// ============================================================================

/// Assemble every stage of `target`.
pub fn compile_target(source_root: &Path, target: &BuildTarget) -> TesseraResult<Vec<StageArtifact>> {
    let assembler = BuildAssembler::new(source_root);
    let artifacts = assembler.assemble(&target.stages)?;
    tracing::info!(
        build_target = %target.name,
        stages = artifacts.len(),
        "Assembled build target"
    );
    Ok(artifacts)
}

/// Write the pretty-printed artifact to `path` and return its digest.
pub fn write_artifact(path: &Path, artifacts: &[StageArtifact]) -> TesseraResult<String> {
    let mut rendered = render_artifact(artifacts);
    rendered.push('\n');
    std::fs::write(path, rendered).map_err(|e| TesseraError::ArtifactWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let digest = artifact_digest(artifacts);
    tracing::info!(path = %path.display(), sha256 = %digest, "Wrote artifact");
    Ok(digest)
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

struct StagePlan {
    stage: String,
    scenarios: Vec<ScenarioPlan>,
}

pub struct Orchestrator<C: LedgerClient> {
    ctx: RunContext<C>,
}

impl<C: LedgerClient> Orchestrator<C> {
    pub fn new(ctx: RunContext<C>) -> Self {
        Self { ctx }
    }

    /// Deploy the whole target into a database named `name`.
    pub async fn deploy(&self, name: &str) -> TesseraResult<StageReport> {
        let artifacts = compile_target(&self.ctx.source_root, &self.ctx.target)?;
        wait_until_ready(&self.ctx.client, &self.ctx.policy).await?;

        let database = DatabaseId::new(&self.ctx.network, name);
        self.ctx.client.create_database(&database).await?;
        let last = artifacts.last().map(|a| a.stage.clone()).unwrap_or_default();
        self.setup_schema(&database, &last, &artifacts).await?;

        tracing::info!(database = %database, stages = artifacts.len(), "Deployed build target");
        Ok(StageReport {
            stage: last,
            database,
            scenarios: Vec::new(),
        })
    }

    /// Run every stage's scenarios against a fresh database holding the
    /// cumulative schema through that stage.
    pub async fn test(&self) -> TesseraResult<RunReport> {
        let (artifacts, plans) = self.load()?;
        wait_until_ready(&self.ctx.client, &self.ctx.policy).await?;

        let monitor = self.ctx.monitor();
        let mut report = RunReport::default();

        for (position, plan) in plans.iter().enumerate() {
            let accumulated = &artifacts[..=position];
            let database = DatabaseId::new(
                &self.ctx.network,
                &format!("{}-{}", plan.stage, Uuid::now_v7().simple()),
            );
            tracing::info!(stage = %plan.stage, database = %database, "Testing stage");

            self.ctx.client.create_database(&database).await?;
            self.setup_schema(&database, &plan.stage, accumulated).await?;

            let runner = ScenarioRunner::new(
                &self.ctx.client,
                &database,
                &self.ctx.root_key,
                &monitor,
            );
            let mut scenarios = Vec::with_capacity(plan.scenarios.len());
            for scenario in &plan.scenarios {
                scenarios.push(runner.run(scenario).await?);
            }

            tracing::info!(stage = %plan.stage, scenarios = scenarios.len(), "Stage passed");
            report.stages.push(StageReport {
                stage: plan.stage.clone(),
                database,
                scenarios,
            });
        }

        Ok(report)
    }

    /// Assemble every stage and load every scenario.
    fn load(&self) -> TesseraResult<(Vec<StageArtifact>, Vec<StagePlan>)> {
        let artifacts = compile_target(&self.ctx.source_root, &self.ctx.target)?;
        let mut plans = Vec::with_capacity(artifacts.len());
        for stage in &self.ctx.target.stages {
            let stage_dir = self.ctx.stage_dir(stage);
            let manifest = ScenarioManifest::load(&stage_dir)?;
            let scenarios = manifest
                .scenarios
                .iter()
                .map(|name| ScenarioPlan::load(&stage_dir, name))
                .collect::<TesseraResult<Vec<_>>>()?;
            tracing::debug!(stage = %stage, scenarios = scenarios.len(), "Loaded scenarios");
            plans.push(StagePlan {
                stage: stage.clone(),
                scenarios,
            });
        }
        Ok((artifacts, plans))
    }

    /// Submit each stage artifact as one privileged transaction, in order.
    async fn setup_schema(
        &self,
        database: &DatabaseId,
        stage: &str,
        artifacts: &[StageArtifact],
    ) -> TesseraResult<()> {
        let conn = self.ctx.client.open(database, &self.ctx.root_key).await?;

        for artifact in artifacts {
            if artifact.operations.is_empty() {
                tracing::debug!(stage, source_stage = %artifact.stage, "Skipping empty stage transaction");
                continue;
            }
            let value = artifact.to_value();
            let payload = to_canonical_string(&value);
            let failure = match conn.submit_and_wait(&value).await {
                Ok(record) => error_marker(&record, &self.ctx.error_markers),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = failure {
                tracing::error!(
                    stage,
                    source_stage = %artifact.stage,
                    reason = %reason,
                    transaction = %payload,
                    "Schema setup failed"
                );
                return Err(TesseraError::SchemaSetupFailed {
                    stage: stage.to_string(),
                    source_stage: artifact.stage.clone(),
                    reason,
                    transaction: payload,
                });
            }
            tracing::debug!(stage, source_stage = %artifact.stage, "Applied stage transaction");
        }
        Ok(())
    }
}
