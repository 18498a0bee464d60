//! Scenario loading and running against the in-memory ledger.

use serde_json::{json, Value};
use tessera_harness::{ScenarioPlan, ScenarioReport, ScenarioRunner, TransactionMonitor};
use tessera_ledger::LedgerClient;
use tessera_test_utils::assertions::{
    assert_config_error, assert_role_count_mismatch, assert_scenario_error,
};
use tessera_test_utils::fixtures::{fast_policy, key, root_key, ProjectTree};
use tessera_test_utils::{
    DatabaseId, InMemoryLedger, LedgerError, Phase, QueryRequest, ScenarioError, TesseraResult,
};
use tokio::sync::watch;

const STAGE: &str = "roles";
const SCENARIO: &str = "owner";

fn db() -> DatabaseId {
    DatabaseId::new("test", "scenario")
}

/// user0 reads everything, user1 reads nothing.
fn by_identity(request: &QueryRequest) -> Result<Vec<Value>, LedgerError> {
    if request.identity == "user0" {
        Ok(vec![json!({"_id": 1, "person/name": "ann"})])
    } else {
        Ok(Vec::new())
    }
}

/// Transactions from user1 are rejected.
fn reject_user1(ledger: InMemoryLedger) -> InMemoryLedger {
    ledger.with_outcome(|s| {
        if s.identity == "user1" {
            Ok(InMemoryLedger::error_record(s, "insufficient permissions"))
        } else {
            Ok(InMemoryLedger::committed_record(s))
        }
    })
}

fn scenario_tree() -> ProjectTree {
    ProjectTree::new()
        .users(
            STAGE,
            SCENARIO,
            &[key(0), key(1)],
            json!({"yes": 0, "no": [1], "tyes": [0], "tno": 1}),
        )
        .phase(STAGE, SCENARIO, Phase::Prepare, json!([
            {"_id": "person$ann", "name": "ann", "COMMENT": "seed"}
        ]))
        .phase(STAGE, SCENARIO, Phase::YesQuery, json!([
            {"select": ["*"], "from": "person", "COMMENT": "owner sees own"}
        ]))
        .phase(STAGE, SCENARIO, Phase::NoQuery, json!([
            {"select": ["*"], "from": "person"}
        ]))
        .phase(STAGE, SCENARIO, Phase::YesTransaction, json!([
            {"_id": ["person/name", "ann"], "age": 31}
        ]))
        .phase(STAGE, SCENARIO, Phase::NoTransaction, json!([
            [{"_id": ["person/name", "ann"], "age": 99}, {"_id": "person$bob", "name": "bob"}]
        ]))
        .phase(STAGE, SCENARIO, Phase::Cleanup, json!([
            {"_id": ["person/name", "ann"], "_action": "delete"}
        ]))
}

async fn run(tree: &ProjectTree, ledger: &InMemoryLedger) -> TesseraResult<ScenarioReport> {
    let plan = ScenarioPlan::load(&tree.path(STAGE), SCENARIO)?;
    ledger.create_database(&db()).await?;
    let (_tx, rx) = watch::channel(false);
    let monitor = TransactionMonitor::new(
        fast_policy(),
        vec!["_tx/error".to_string(), "error".to_string()],
        rx,
    );
    let database = db();
    let root = root_key();
    let runner = ScenarioRunner::new(ledger, &database, &root, &monitor);
    runner.run(&plan).await
}

// ============================================================================
// LOADING
// ============================================================================

#[test]
fn test_plan_strips_comments_and_normalizes_entries() {
    let tree = scenario_tree();
    let plan = ScenarioPlan::load(&tree.path(STAGE), SCENARIO).unwrap();

    assert_eq!(plan.yes, vec![json!({"select": ["*"], "from": "person"})]);
    assert_eq!(plan.tyes.len(), 1);
    assert_eq!(plan.tyes[0].len(), 1);
    assert_eq!(plan.tno[0].len(), 2);
    assert_eq!(plan.roles.tno[0].account_id, "user1");
    assert_eq!(plan.prepare.as_ref().map(Vec::len), Some(1));
}

#[test]
fn test_role_count_mismatch_detected_at_load() {
    let tree = scenario_tree().users(
        STAGE,
        SCENARIO,
        &[key(0), key(1)],
        json!({"yes": [0, 1], "no": [1], "tyes": [0], "tno": 1}),
    );
    let result = ScenarioPlan::load(&tree.path(STAGE), SCENARIO);
    assert_role_count_mismatch(&result, SCENARIO, Phase::YesQuery, 2, 1);

    let message = result.unwrap_err().to_string();
    assert!(message.contains(SCENARIO));
}

#[test]
fn test_phase_file_must_be_a_list() {
    let tree = scenario_tree().phase(STAGE, SCENARIO, Phase::YesQuery, json!({"select": ["*"]}));
    let result = ScenarioPlan::load(&tree.path(STAGE), SCENARIO);
    assert_config_error(&result);
}

#[test]
fn test_missing_phase_files_are_empty() {
    let tree = ProjectTree::new().users(STAGE, "empty", &[key(0)], json!({}));
    let plan = ScenarioPlan::load(&tree.path(STAGE), "empty").unwrap();
    assert!(plan.prepare.is_none());
    assert!(plan.yes.is_empty() && plan.no.is_empty());
    assert!(plan.tyes.is_empty() && plan.tno.is_empty());
    assert!(plan.clean.is_none());
}

#[test]
fn test_scenario_transactions_are_expanded() {
    let tree = ProjectTree::new()
        .users(STAGE, "fn", &[key(0)], json!({"tyes": 0}))
        .phase(STAGE, "fn", Phase::YesTransaction, json!([
            {"_id": "_fn", "params": ["?me"], "code_from_query": {"where": "PARAM"}}
        ]));
    let plan = ScenarioPlan::load(&tree.path(STAGE), "fn").unwrap();
    assert!(plan.tyes[0][0].is_expanded());
}

// ============================================================================
// RUNNING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_full_scenario_passes() {
    let tree = scenario_tree();
    let ledger = reject_user1(InMemoryLedger::new().with_query_responder(by_identity));

    let report = run(&tree, &ledger).await.unwrap();
    assert_eq!(report.yes_queries, 1);
    assert_eq!(report.no_transactions, 1);

    let submitters: Vec<String> = ledger
        .submissions()
        .into_iter()
        .map(|s| s.identity)
        .collect();
    assert_eq!(submitters, vec!["root", "user0", "user1", "root"]);

    let queriers: Vec<String> = ledger
        .queries()
        .into_iter()
        .map(|q| q.identity)
        .collect();
    assert_eq!(queriers, vec!["user0", "user1"]);
}

#[tokio::test(start_paused = true)]
async fn test_object_entry_submitted_as_one_op_transaction() {
    let tree = scenario_tree();
    let ledger = reject_user1(InMemoryLedger::new().with_query_responder(by_identity));
    run(&tree, &ledger).await.unwrap();

    let tyes = &ledger.submissions()[1];
    assert_eq!(tyes.transaction, json!([{"_id": ["person/name", "ann"], "age": 31}]));
}

#[tokio::test(start_paused = true)]
async fn test_empty_yes_query_fails() {
    let tree = scenario_tree();
    let ledger = reject_user1(InMemoryLedger::new());

    let result = run(&tree, &ledger).await;
    let err = assert_scenario_error(&result);
    assert!(matches!(
        err,
        ScenarioError::EmptyQueryResult { phase: Phase::YesQuery, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_no_query_with_results_fails() {
    let tree = scenario_tree();
    let ledger = reject_user1(InMemoryLedger::new().with_query_responder(|_| Ok(vec![json!({})])));

    let result = run(&tree, &ledger).await;
    let err = assert_scenario_error(&result);
    assert!(matches!(
        err,
        ScenarioError::UnexpectedQueryResult { count: 1, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_no_query_transport_error_tolerated() {
    let tree = scenario_tree();
    let ledger = reject_user1(InMemoryLedger::new().with_query_responder(|request| {
        if request.identity == "user0" {
            Ok(vec![json!({"_id": 1})])
        } else {
            Err(LedgerError::Rejected {
                status: 403,
                message: "forbidden".to_string(),
            })
        }
    }));

    run(&tree, &ledger).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_yes_query_transport_error_fatal() {
    let tree = scenario_tree();
    let ledger = InMemoryLedger::new().with_query_responder(|_| {
        Err(LedgerError::Transport {
            reason: "timeout".to_string(),
        })
    });

    let result = run(&tree, &ledger).await;
    let err = assert_scenario_error(&result);
    assert!(matches!(
        err,
        ScenarioError::Transport { phase: Phase::YesQuery, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_tno_that_commits_fails_scenario() {
    let tree = scenario_tree();
    let ledger = InMemoryLedger::new().with_query_responder(by_identity);

    let result = run(&tree, &ledger).await;
    let err = assert_scenario_error(&result);
    assert!(matches!(err, ScenarioError::MissingExpectedError { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_failed_prepare_is_fatal() {
    let tree = scenario_tree();
    let ledger = InMemoryLedger::new()
        .with_query_responder(by_identity)
        .with_outcome(|s| Ok(InMemoryLedger::error_record(s, "schema violation")));

    let result = run(&tree, &ledger).await;
    let err = assert_scenario_error(&result);
    match err {
        ScenarioError::PrivilegedTransactionFailed { phase, reason, transaction } => {
            assert_eq!(*phase, Phase::Prepare);
            assert_eq!(reason, "schema violation");
            assert!(transaction.contains("person$ann"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(ledger.submissions().len(), 1);
}
