//! Scenario Runner
//!
//! A scenario is a directory of phase files plus a role table. Loading reads
//! and validates everything up front ([`ScenarioPlan::load`]); running
//! ([`ScenarioRunner::run`]) only talks to the ledger.

use crate::monitor::{error_marker, TransactionMonitor, TransactionOutcome};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tessera_core::manifest::read_optional_json_file;
use tessera_core::{
    parse_transaction, strip_comments, transaction_to_value, ConfigError, DatabaseId,
    KeyDescriptor, LedgerError, Operation, Phase, RoleSets, ScenarioError, TesseraError, Transaction,
};
use tessera_ledger::{LedgerClient, LedgerConnection};
use tessera_template::{expand_transaction, to_canonical_string, TemplateContext};

// ============================================================================
// PLAN
// ============================================================================

/// A fully loaded scenario: role keys resolved, queries comment-stripped,
/// transactions expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPlan {
    pub name: String,
    pub dir: PathBuf,
    pub roles: RoleSets,
    pub prepare: Option<Transaction>,
    pub yes: Vec<Value>,
    pub no: Vec<Value>,
    pub tyes: Vec<Transaction>,
    pub tno: Vec<Transaction>,
    pub clean: Option<Transaction>,
}

impl ScenarioPlan {
    /// Load `<stage_dir>/<name>`. Missing phase files are empty phases.
    pub fn load(stage_dir: &Path, name: &str) -> Result<Self, TesseraError> {
        Self::load_and_validate(stage_dir, name).map_err(|e| {
            tracing::error!(
                stage_dir = %stage_dir.display(),
                scenario = name,
                error = %e,
                "Invalid scenario"
            );
            e
        })
    }

    fn load_and_validate(stage_dir: &Path, name: &str) -> Result<Self, TesseraError> {
        let dir = stage_dir.join(name);
        let roles = RoleSets::load(&dir)?;
        let context = TemplateContext::new(&dir);

        let plan = Self {
            name: name.to_string(),
            prepare: load_privileged(&dir, Phase::Prepare, &context)?,
            yes: load_queries(&dir, Phase::YesQuery)?,
            no: load_queries(&dir, Phase::NoQuery)?,
            tyes: load_transactions(&dir, Phase::YesTransaction, &context)?,
            tno: load_transactions(&dir, Phase::NoTransaction, &context)?,
            clean: load_privileged(&dir, Phase::Cleanup, &context)?,
            roles,
            dir,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Number of entries in a role-bound phase.
    pub fn entries(&self, phase: Phase) -> usize {
        match phase {
            Phase::YesQuery => self.yes.len(),
            Phase::NoQuery => self.no.len(),
            Phase::YesTransaction => self.tyes.len(),
            Phase::NoTransaction => self.tno.len(),
            Phase::Prepare => usize::from(self.prepare.is_some()),
            Phase::Cleanup => usize::from(self.clean.is_some()),
        }
    }

    /// Every role-bound phase has exactly one key per entry.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        for phase in Phase::ALL {
            if phase.role_set().is_none() {
                continue;
            }
            let roles = self.roles.for_phase(phase).len();
            let entries = self.entries(phase);
            if roles != entries {
                return Err(ScenarioError::RoleCountMismatch {
                    scenario: self.name.clone(),
                    phase,
                    roles,
                    entries,
                });
            }
        }
        Ok(())
    }
}

fn phase_entries(dir: &Path, phase: Phase) -> Result<Option<Vec<Value>>, ConfigError> {
    let path = dir.join(phase.file_name());
    match read_optional_json_file(&path)? {
        None => Ok(None),
        Some(Value::Array(entries)) => Ok(Some(entries)),
        Some(_) => Err(ConfigError::Parse {
            path,
            reason: "expected a JSON list".to_string(),
        }),
    }
}

fn load_queries(dir: &Path, phase: Phase) -> Result<Vec<Value>, TesseraError> {
    let entries = phase_entries(dir, phase)?.unwrap_or_default();
    Ok(entries.iter().map(strip_comments).collect())
}

/// An array entry is a transaction; an object entry is a one-operation
/// transaction.
fn load_transactions(
    dir: &Path,
    phase: Phase,
    context: &TemplateContext,
) -> Result<Vec<Transaction>, TesseraError> {
    let entries = phase_entries(dir, phase)?.unwrap_or_default();
    entries
        .into_iter()
        .map(|entry| -> Result<Transaction, TesseraError> {
            let transaction = match entry {
                Value::Array(_) => parse_transaction(entry)?,
                other => vec![Operation::from_value(other)?],
            };
            Ok(expand_transaction(transaction, context)?)
        })
        .collect()
}

/// `prepare.json` / `clean.json` hold one transaction.
fn load_privileged(
    dir: &Path,
    phase: Phase,
    context: &TemplateContext,
) -> Result<Option<Transaction>, TesseraError> {
    match phase_entries(dir, phase)? {
        None => Ok(None),
        Some(entries) => {
            let transaction = parse_transaction(Value::Array(entries))?;
            Ok(Some(expand_transaction(transaction, context)?))
        }
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// What a passing scenario exercised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioReport {
    pub scenario: String,
    pub yes_queries: usize,
    pub no_queries: usize,
    pub yes_transactions: usize,
    pub no_transactions: usize,
}

pub struct ScenarioRunner<'a, C: LedgerClient> {
    client: &'a C,
    database: &'a DatabaseId,
    root_key: &'a KeyDescriptor,
    monitor: &'a TransactionMonitor,
}

impl<'a, C: LedgerClient> ScenarioRunner<'a, C> {
    pub fn new(
        client: &'a C,
        database: &'a DatabaseId,
        root_key: &'a KeyDescriptor,
        monitor: &'a TransactionMonitor,
    ) -> Self {
        Self {
            client,
            database,
            root_key,
            monitor,
        }
    }

    /// Run every phase in order; the first failure ends the scenario.
    pub async fn run(&self, plan: &ScenarioPlan) -> Result<ScenarioReport, TesseraError> {
        tracing::info!(scenario = %plan.name, database = %self.database, "Running scenario");

        if let Some(prepare) = &plan.prepare {
            self.run_privileged(Phase::Prepare, prepare).await?;
        }
        for (key, query) in plan.roles.yes.iter().zip(&plan.yes) {
            self.expect_results(key, query).await?;
        }
        for (key, query) in plan.roles.no.iter().zip(&plan.no) {
            self.expect_no_results(key, query).await?;
        }
        for (key, transaction) in plan.roles.tyes.iter().zip(&plan.tyes) {
            self.run_scoped(Phase::YesTransaction, key, transaction).await?;
        }
        for (key, transaction) in plan.roles.tno.iter().zip(&plan.tno) {
            self.run_scoped(Phase::NoTransaction, key, transaction).await?;
        }
        if let Some(clean) = &plan.clean {
            self.run_privileged(Phase::Cleanup, clean).await?;
        }

        tracing::info!(scenario = %plan.name, "Scenario passed");
        Ok(ScenarioReport {
            scenario: plan.name.clone(),
            yes_queries: plan.yes.len(),
            no_queries: plan.no.len(),
            yes_transactions: plan.tyes.len(),
            no_transactions: plan.tno.len(),
        })
    }

    async fn run_privileged(
        &self,
        phase: Phase,
        transaction: &Transaction,
    ) -> Result<(), ScenarioError> {
        let value = transaction_to_value(transaction);
        let payload = to_canonical_string(&value);
        let fail = |reason: String| {
            tracing::error!(phase = %phase, reason = %reason, transaction = %payload, "Privileged transaction failed");
            ScenarioError::PrivilegedTransactionFailed {
                phase,
                reason,
                transaction: payload.clone(),
            }
        };

        let conn = self
            .client
            .open(self.database, self.root_key)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let record = conn
            .submit_and_wait(&value)
            .await
            .map_err(|e| fail(e.to_string()))?;
        if let Some(error) = error_marker(&record, self.monitor.markers()) {
            return Err(fail(error));
        }
        tracing::debug!(phase = %phase, operations = transaction.len(), "Privileged transaction committed");
        Ok(())
    }

    async fn expect_results(&self, key: &KeyDescriptor, query: &Value) -> Result<(), ScenarioError> {
        let phase = Phase::YesQuery;
        let payload = to_canonical_string(query);
        let results = match self.query_as(key, query).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(phase = %phase, identity = %key.account_id, error = %e, query = %payload, "Query failed");
                return Err(ScenarioError::Transport {
                    phase,
                    reason: e.to_string(),
                    payload,
                });
            }
        };
        if results.is_empty() {
            tracing::error!(phase = %phase, identity = %key.account_id, query = %payload, "Query returned no results");
            return Err(ScenarioError::EmptyQueryResult {
                phase,
                query: payload,
            });
        }
        Ok(())
    }

    async fn expect_no_results(
        &self,
        key: &KeyDescriptor,
        query: &Value,
    ) -> Result<(), ScenarioError> {
        let phase = Phase::NoQuery;
        let payload = to_canonical_string(query);
        match self.query_as(key, query).await {
            Err(e) => {
                tracing::warn!(phase = %phase, identity = %key.account_id, error = %e, "Query failed; treating as no results");
                Ok(())
            }
            Ok(results) if results.is_empty() => Ok(()),
            Ok(results) => {
                tracing::error!(
                    phase = %phase,
                    identity = %key.account_id,
                    count = results.len(),
                    query = %payload,
                    "Query returned results but none were expected"
                );
                Err(ScenarioError::UnexpectedQueryResult {
                    phase,
                    count: results.len(),
                    query: payload,
                })
            }
        }
    }

    async fn query_as(
        &self,
        key: &KeyDescriptor,
        query: &Value,
    ) -> Result<Vec<Value>, LedgerError> {
        let conn = self.client.open(self.database, key).await?;
        conn.query(query).await
    }

    async fn run_scoped(
        &self,
        phase: Phase,
        key: &KeyDescriptor,
        transaction: &Transaction,
    ) -> Result<TransactionOutcome, ScenarioError> {
        let value = transaction_to_value(transaction);
        let expect_success = phase.expects_success();
        let open_failed = |e: LedgerError| {
            tracing::error!(phase = %phase, identity = %key.account_id, error = %e, "Could not open connection");
            ScenarioError::Transport {
                phase,
                reason: e.to_string(),
                payload: to_canonical_string(&value),
            }
        };

        let privileged = self
            .client
            .open(self.database, self.root_key)
            .await
            .map_err(&open_failed)?;
        let scoped = self
            .client
            .open(self.database, key)
            .await
            .map_err(&open_failed)?;

        let outcome = self
            .monitor
            .run_transaction(&privileged, &scoped, &value, expect_success)
            .await?;
        tracing::debug!(phase = %phase, identity = %key.account_id, outcome = ?outcome, "Transaction checked");
        Ok(outcome)
    }
}
