//! Polling Transaction Monitor
//!
//! Submits a transaction as a scoped identity without waiting for finality,
//! then polls the transaction record through both the privileged and the
//! scoped connection until the privileged view shows it committed.
//!
//! Outcome matrix once committed:
//!
//! ```text
//!                          expect success              expect failure
//! scoped view empty        InsufficientOwnReadRights   warn, continue
//! record has error marker  UnexpectedTransactionError  RejectedAsExpected
//! record clean             Committed                   MissingExpectedError
//! transport error          Transport                   RejectedAsExpected
//! ```

use serde_json::Value;
use tessera_core::{LedgerError, Phase, PollPolicy, ScenarioError, TxId};
use tessera_ledger::LedgerConnection;
use tessera_template::to_canonical_string;
use tokio::sync::watch;
use tokio::time::Instant;

/// How a monitored transaction ended, when that end matched expectations.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    /// Committed cleanly, as expected.
    Committed { tx_id: TxId, record: Value },
    /// Failed, as expected. `tx_id` is absent when submission itself failed.
    RejectedAsExpected { tx_id: Option<TxId>, reason: String },
}

/// First error marker present in a committed record, rendered as text.
pub fn error_marker(record: &Value, markers: &[String]) -> Option<String> {
    markers.iter().find_map(|key| match record.get(key.as_str()) {
        None | Some(Value::Null) => None,
        Some(Value::String(message)) => Some(message.clone()),
        Some(other) => Some(other.to_string()),
    })
}

pub struct TransactionMonitor {
    policy: PollPolicy,
    markers: Vec<String>,
    shutdown: watch::Receiver<bool>,
}

impl TransactionMonitor {
    pub fn new(policy: PollPolicy, markers: Vec<String>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            policy,
            markers,
            shutdown,
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Run one transaction through `scoped` and judge the result seen by
    /// `privileged`.
    pub async fn run_transaction<P, S>(
        &self,
        privileged: &P,
        scoped: &S,
        transaction: &Value,
        expect_success: bool,
    ) -> Result<TransactionOutcome, ScenarioError>
    where
        P: LedgerConnection + ?Sized,
        S: LedgerConnection + ?Sized,
    {
        let payload = to_canonical_string(transaction);

        let tx_id = match scoped.submit(transaction).await {
            Ok(tx_id) => tx_id,
            Err(e) => return self.transport_failure(None, e, expect_success, payload),
        };
        tracing::debug!(tx_id = %tx_id, identity = scoped.identity(), "Submitted transaction");

        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut shutdown = self.shutdown.clone();
        let mut signal_open = true;

        loop {
            if *shutdown.borrow() {
                return Err(ScenarioError::Cancelled {
                    tx_id: tx_id.to_string(),
                });
            }

            let authoritative = match privileged.query_by_tx_id(&tx_id).await {
                Ok(records) => records,
                Err(e) => return self.transport_failure(Some(tx_id), e, expect_success, payload),
            };
            let own = match scoped.query_by_tx_id(&tx_id).await {
                Ok(records) => records,
                Err(e) => return self.transport_failure(Some(tx_id), e, expect_success, payload),
            };

            if let Some(record) = authoritative.into_iter().next() {
                tracing::debug!(tx_id = %tx_id, attempts, "Transaction committed");
                return self.judge(tx_id, record, !own.is_empty(), expect_success, payload);
            }

            attempts += 1;
            if attempts % self.policy.notice_every.max(1) == 0 {
                tracing::info!(tx_id = %tx_id, attempt = attempts, "Still waiting for transaction to commit");
            }
            if let Some(deadline) = self.policy.deadline {
                let waited = started.elapsed();
                if waited >= deadline {
                    tracing::error!(
                        tx_id = %tx_id,
                        attempts,
                        transaction = %payload,
                        "Gave up waiting for transaction"
                    );
                    return Err(ScenarioError::TimedOut {
                        tx_id: tx_id.to_string(),
                        attempts,
                        waited,
                    });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.interval) => {}
                changed = shutdown.changed(), if signal_open => {
                    if changed.is_err() {
                        signal_open = false;
                    } else if *shutdown.borrow() {
                        return Err(ScenarioError::Cancelled {
                            tx_id: tx_id.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn judge(
        &self,
        tx_id: TxId,
        record: Value,
        own_visible: bool,
        expect_success: bool,
        payload: String,
    ) -> Result<TransactionOutcome, ScenarioError> {
        if !own_visible {
            if expect_success {
                tracing::error!(tx_id = %tx_id, transaction = %payload, "Submitter cannot read its own transaction");
                return Err(ScenarioError::InsufficientOwnReadRights {
                    tx_id: tx_id.to_string(),
                    transaction: payload,
                });
            }
            tracing::warn!(
                tx_id = %tx_id,
                transaction = %payload,
                "Submitter cannot read its own transaction; failure was expected, continuing"
            );
        }

        match (error_marker(&record, &self.markers), expect_success) {
            (Some(error), true) => {
                tracing::error!(tx_id = %tx_id, error = %error, transaction = %payload, "Transaction failed unexpectedly");
                Err(ScenarioError::UnexpectedTransactionError {
                    tx_id: tx_id.to_string(),
                    error,
                    transaction: payload,
                })
            }
            (Some(error), false) => {
                tracing::debug!(tx_id = %tx_id, error = %error, "Transaction rejected as expected");
                Ok(TransactionOutcome::RejectedAsExpected {
                    tx_id: Some(tx_id),
                    reason: error,
                })
            }
            (None, true) => Ok(TransactionOutcome::Committed { tx_id, record }),
            (None, false) => {
                tracing::error!(tx_id = %tx_id, transaction = %payload, "Transaction committed but was expected to fail");
                Err(ScenarioError::MissingExpectedError {
                    tx_id: tx_id.to_string(),
                    transaction: payload,
                })
            }
        }
    }

    fn transport_failure(
        &self,
        tx_id: Option<TxId>,
        error: LedgerError,
        expect_success: bool,
        payload: String,
    ) -> Result<TransactionOutcome, ScenarioError> {
        let phase = if expect_success {
            Phase::YesTransaction
        } else {
            Phase::NoTransaction
        };
        if expect_success {
            tracing::error!(phase = %phase, error = %error, transaction = %payload, "Ledger error during transaction");
            return Err(ScenarioError::Transport {
                phase,
                reason: error.to_string(),
                payload,
            });
        }
        tracing::warn!(phase = %phase, error = %error, "Ledger error on a transaction expected to fail");
        Ok(TransactionOutcome::RejectedAsExpected {
            tx_id,
            reason: error.to_string(),
        })
    }
}
