//! In-memory ledger for tests.
//!
//! Records every database, submission and query. Behavior is scripted
//! through three rules:
//!
//! - query responder: answers `query` calls (default: no results)
//! - outcome rule: the committed record for a submission, or a submission
//!   error (default: a clean record)
//! - visibility rule: whether an identity may read a committed record
//!   (default: everyone)
//!
//! Transactions submitted without waiting become visible after
//! `commit_after` transaction-by-id lookups.

use crate::{LedgerClient, LedgerConnection};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tessera_core::{DatabaseId, KeyDescriptor, LedgerError, TxId};

/// A query as the ledger received it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub database: DatabaseId,
    pub identity: String,
    pub query: Value,
}

/// A transaction as the ledger received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub database: DatabaseId,
    pub identity: String,
    pub tx_id: TxId,
    pub transaction: Value,
    /// Submitted through `submit_and_wait`.
    pub waited: bool,
}

type QueryResponder = dyn Fn(&QueryRequest) -> Result<Vec<Value>, LedgerError> + Send + Sync;
type OutcomeRule = dyn Fn(&Submission) -> Result<Value, LedgerError> + Send + Sync;
type VisibilityRule = dyn Fn(&str, &Submission) -> bool + Send + Sync;

struct PendingRecord {
    submission: usize,
    record: Value,
    lookups: u32,
    visible_after: u32,
}

#[derive(Default)]
struct LedgerState {
    databases: Vec<DatabaseId>,
    submissions: Vec<Submission>,
    records: HashMap<TxId, PendingRecord>,
    queries: Vec<QueryRequest>,
    next_tx: u64,
    health_checks: u32,
}

#[derive(Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    responder: Arc<QueryResponder>,
    outcome: Arc<OutcomeRule>,
    visibility: Arc<VisibilityRule>,
    commit_after: u32,
    health_failures: u32,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            responder: Arc::new(|_| Ok(Vec::new())),
            outcome: Arc::new(|submission| Ok(Self::committed_record(submission))),
            visibility: Arc::new(|_, _| true),
            commit_after: 0,
            health_failures: 0,
        }
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&QueryRequest) -> Result<Vec<Value>, LedgerError> + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    pub fn with_outcome<F>(mut self, outcome: F) -> Self
    where
        F: Fn(&Submission) -> Result<Value, LedgerError> + Send + Sync + 'static,
    {
        self.outcome = Arc::new(outcome);
        self
    }

    pub fn with_visibility<F>(mut self, visibility: F) -> Self
    where
        F: Fn(&str, &Submission) -> bool + Send + Sync + 'static,
    {
        self.visibility = Arc::new(visibility);
        self
    }

    /// Only `privileged` and the submitting identity can read a record.
    pub fn with_submitter_visibility(self, privileged: impl Into<String>) -> Self {
        let privileged = privileged.into();
        self.with_visibility(move |identity, submission| {
            identity == privileged || identity == submission.identity
        })
    }

    /// Number of lookups that see nothing before a record becomes visible.
    pub fn with_commit_after(mut self, lookups: u32) -> Self {
        self.commit_after = lookups;
        self
    }

    /// Fail the first `count` health checks.
    pub fn with_health_failures(mut self, count: u32) -> Self {
        self.health_failures = count;
        self
    }

    /// The default record for a clean commit.
    pub fn committed_record(submission: &Submission) -> Value {
        json!({
            "_tx/id": submission.tx_id.as_str(),
            "status": 200
        })
    }

    /// A committed record carrying an error marker.
    pub fn error_record(submission: &Submission, message: &str) -> Value {
        json!({
            "_tx/id": submission.tx_id.as_str(),
            "_tx/error": message,
            "status": 400
        })
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn databases(&self) -> Vec<DatabaseId> {
        self.state().databases.clone()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Submissions to one database, in arrival order.
    pub fn submissions_to(&self, database: &DatabaseId) -> Vec<Submission> {
        self.state()
            .submissions
            .iter()
            .filter(|s| &s.database == database)
            .cloned()
            .collect()
    }

    pub fn queries(&self) -> Vec<QueryRequest> {
        self.state().queries.clone()
    }

    pub fn health_checks(&self) -> u32 {
        self.state().health_checks
    }

    /// Count of everything that would have crossed the network.
    pub fn request_count(&self) -> usize {
        let state = self.state();
        state.databases.len() + state.submissions.len() + state.queries.len()
    }

    fn require_database(&self, database: &DatabaseId) -> Result<(), LedgerError> {
        if self.state().databases.contains(database) {
            Ok(())
        } else {
            Err(LedgerError::UnknownDatabase {
                database: database.to_string(),
            })
        }
    }

    fn record_submission(
        &self,
        database: &DatabaseId,
        identity: &str,
        transaction: &Value,
        waited: bool,
    ) -> Result<(TxId, Value), LedgerError> {
        self.require_database(database)?;

        let (index, submission) = {
            let mut state = self.state();
            state.next_tx += 1;
            let submission = Submission {
                database: database.clone(),
                identity: identity.to_string(),
                tx_id: TxId::new(format!("tx-{:04}", state.next_tx)),
                transaction: transaction.clone(),
                waited,
            };
            state.submissions.push(submission.clone());
            (state.submissions.len() - 1, submission)
        };

        let record = (self.outcome)(&submission)?;

        self.state().records.insert(
            submission.tx_id.clone(),
            PendingRecord {
                submission: index,
                record: record.clone(),
                lookups: 0,
                visible_after: if waited { 0 } else { self.commit_after },
            },
        );
        Ok((submission.tx_id, record))
    }

    fn lookup(&self, identity: &str, tx_id: &TxId) -> Vec<Value> {
        let mut state = self.state();
        let LedgerState {
            submissions,
            records,
            ..
        } = &mut *state;
        let Some(pending) = records.get_mut(tx_id) else {
            return Vec::new();
        };
        pending.lookups += 1;
        if pending.lookups <= pending.visible_after {
            return Vec::new();
        }
        match submissions.get(pending.submission) {
            Some(submission) if (self.visibility)(identity, submission) => {
                vec![pending.record.clone()]
            }
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    type Connection = InMemoryConnection;

    async fn health(&self) -> Result<(), LedgerError> {
        let mut state = self.state();
        state.health_checks += 1;
        if state.health_checks <= self.health_failures {
            return Err(LedgerError::Transport {
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn create_database(&self, database: &DatabaseId) -> Result<(), LedgerError> {
        let mut state = self.state();
        if state.databases.contains(database) {
            return Err(LedgerError::Rejected {
                status: 400,
                message: format!("database {} already exists", database),
            });
        }
        state.databases.push(database.clone());
        Ok(())
    }

    async fn open(
        &self,
        database: &DatabaseId,
        key: &KeyDescriptor,
    ) -> Result<InMemoryConnection, LedgerError> {
        self.require_database(database)?;
        Ok(InMemoryConnection {
            ledger: self.clone(),
            database: database.clone(),
            identity: key.account_id.clone(),
        })
    }
}

pub struct InMemoryConnection {
    ledger: InMemoryLedger,
    database: DatabaseId,
    identity: String,
}

#[async_trait]
impl LedgerConnection for InMemoryConnection {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn database(&self) -> &DatabaseId {
        &self.database
    }

    async fn submit(&self, transaction: &Value) -> Result<TxId, LedgerError> {
        let (tx_id, _) =
            self.ledger
                .record_submission(&self.database, &self.identity, transaction, false)?;
        Ok(tx_id)
    }

    async fn submit_and_wait(&self, transaction: &Value) -> Result<Value, LedgerError> {
        let (_, record) =
            self.ledger
                .record_submission(&self.database, &self.identity, transaction, true)?;
        Ok(record)
    }

    async fn query(&self, query: &Value) -> Result<Vec<Value>, LedgerError> {
        let request = QueryRequest {
            database: self.database.clone(),
            identity: self.identity.clone(),
            query: query.clone(),
        };
        self.ledger.state().queries.push(request.clone());
        (self.ledger.responder)(&request)
    }

    async fn query_by_tx_id(&self, tx_id: &TxId) -> Result<Vec<Value>, LedgerError> {
        Ok(self.ledger.lookup(&self.identity, tx_id))
    }
}
