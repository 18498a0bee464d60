//! Tessera Harness - Staged Authorization Testing
//!
//! Runs a build target against a live ledger. Each stage gets a fresh
//! database holding every earlier stage's schema plus its own; each scenario
//! then checks what each role may read and write.
//!
//! - [`monitor`]: submit-and-poll for a transaction's committed outcome
//! - [`scenario`]: one role-keyed scenario directory
//! - [`orchestrator`]: stage loop, schema setup, compile and deploy

pub mod context;
pub mod monitor;
pub mod orchestrator;
pub mod scenario;

pub use context::RunContext;
pub use monitor::{error_marker, TransactionMonitor, TransactionOutcome};
pub use orchestrator::{compile_target, write_artifact, Orchestrator, RunReport, StageReport};
pub use scenario::{ScenarioPlan, ScenarioReport, ScenarioRunner};
