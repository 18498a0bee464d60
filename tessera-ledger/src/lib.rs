//! Tessera Ledger - Database Capability
//!
//! The harness talks to the ledger only through the two traits below. A
//! client manages databases; a connection is one identity's view of one
//! database and is opened per scenario entry.
//!
//! Implementations:
//! - [`HttpLedgerClient`]: the ledger's HTTP API (reqwest)
//! - [`InMemoryLedger`]: deterministic in-process ledger for tests

pub mod http;
pub mod mock;

pub use http::{
    tx_lookup_query, HttpConnection, HttpLedgerClient, RequestSigner, SignableRequest,
    UnsignedRequests,
};
pub use mock::{InMemoryConnection, InMemoryLedger, QueryRequest, Submission};

use async_trait::async_trait;
use serde_json::Value;
use tessera_core::{DatabaseId, KeyDescriptor, LedgerError, PollPolicy, TxId};
use tokio::time::Instant;

/// Database lifecycle and connection factory.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    type Connection: LedgerConnection;

    /// Succeeds once the ledger accepts requests.
    async fn health(&self) -> Result<(), LedgerError>;

    async fn create_database(&self, database: &DatabaseId) -> Result<(), LedgerError>;

    /// Open `database` acting as `key`.
    async fn open(
        &self,
        database: &DatabaseId,
        key: &KeyDescriptor,
    ) -> Result<Self::Connection, LedgerError>;
}

/// One identity's access to one database.
#[async_trait]
pub trait LedgerConnection: Send + Sync {
    /// Account id the connection acts as.
    fn identity(&self) -> &str;

    fn database(&self) -> &DatabaseId;

    /// Submit without waiting for finality.
    async fn submit(&self, transaction: &Value) -> Result<TxId, LedgerError>;

    /// Submit and wait for the committed transaction record.
    async fn submit_and_wait(&self, transaction: &Value) -> Result<Value, LedgerError>;

    async fn query(&self, query: &Value) -> Result<Vec<Value>, LedgerError>;

    /// Committed record(s) of a transaction, as far as this identity may see.
    /// Empty while the transaction is pending or hidden.
    async fn query_by_tx_id(&self, tx_id: &TxId) -> Result<Vec<Value>, LedgerError>;
}

/// Probe [`LedgerClient::health`] until it succeeds, sleeping
/// `policy.interval` between attempts and giving up at `policy.deadline`.
pub async fn wait_until_ready<C>(client: &C, policy: &PollPolicy) -> Result<(), LedgerError>
where
    C: LedgerClient + ?Sized,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        let error = match client.health().await {
            Ok(()) => {
                tracing::info!(attempts, "Ledger is ready");
                return Ok(());
            }
            Err(e) => e,
        };

        attempts += 1;
        if attempts % policy.notice_every.max(1) == 0 {
            tracing::info!(attempts, error = %error, "Still waiting for the ledger");
        }
        if let Some(deadline) = policy.deadline {
            if started.elapsed() >= deadline {
                return Err(LedgerError::Transport {
                    reason: format!("ledger not ready after {} attempts: {}", attempts, error),
                });
            }
        }
        tokio::time::sleep(policy.interval).await;
    }
}
