//! Error types for Tessera operations

use crate::Phase;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Template compilation and resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Parameter count mismatch: query has {expected} PARAM markers but {actual} params were supplied: {query}")]
    ParameterCountMismatch {
        expected: usize,
        actual: usize,
        query: String,
    },

    #[error("Template resolution failed for {}: {reason}", path.display())]
    Resolution { path: PathBuf, reason: String },

    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    #[error("In template file {}: {source}", path.display())]
    InFile {
        path: PathBuf,
        source: Box<TemplateError>,
    },
}

/// Scenario execution errors.
///
/// Payload fields (`transaction`, `query`) hold the compact serialized entry
/// that triggered the error; they are logged at the failure site and kept out
/// of the display string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("Role count mismatch in scenario '{scenario}' {phase}: {roles} roles for {entries} entries")]
    RoleCountMismatch {
        scenario: String,
        phase: Phase,
        roles: usize,
        entries: usize,
    },

    #[error("Role index {index} in '{set}' of scenario '{scenario}' is out of range ({keys} keys)")]
    RoleIndexOutOfRange {
        scenario: String,
        set: String,
        index: usize,
        keys: usize,
    },

    #[error("Insufficient rights to read own transaction {tx_id}")]
    InsufficientOwnReadRights { tx_id: String, transaction: String },

    #[error("Transaction {tx_id} failed unexpectedly: {error}")]
    UnexpectedTransactionError {
        tx_id: String,
        error: String,
        transaction: String,
    },

    #[error("Transaction {tx_id} committed but was expected to fail")]
    MissingExpectedError { tx_id: String, transaction: String },

    #[error("Query in {phase} returned no results but results were expected")]
    EmptyQueryResult { phase: Phase, query: String },

    #[error("Query in {phase} returned {count} results but none were expected")]
    UnexpectedQueryResult {
        phase: Phase,
        count: usize,
        query: String,
    },

    #[error("Privileged {phase} transaction failed: {reason}")]
    PrivilegedTransactionFailed {
        phase: Phase,
        reason: String,
        transaction: String,
    },

    #[error("Ledger error during {phase}: {reason}")]
    Transport {
        phase: Phase,
        reason: String,
        payload: String,
    },

    #[error("Timed out after {waited:?} ({attempts} polls) waiting for transaction {tx_id}")]
    TimedOut {
        tx_id: String,
        attempts: u32,
        waited: Duration,
    },

    #[error("Cancelled while waiting for transaction {tx_id}")]
    Cancelled { tx_id: String },
}

/// Errors surfaced by the ledger capability. This is the single error kind
/// the database collaborator produces.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger transport error: {reason}")]
    Transport { reason: String },

    #[error("Ledger rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid ledger response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Unknown database: {database}")]
    UnknownDatabase { database: String },
}

/// Configuration and manifest errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or TESSERA_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },

    #[error("Failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown build target: {target}")]
    UnknownTarget { target: String },

    #[error("Stage '{stage}' is not part of target '{target}'")]
    UnknownStage { target: String, stage: String },
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error)]
pub enum TesseraError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema setup for stage '{stage}' failed on the transaction from stage '{source_stage}': {reason}")]
    SchemaSetupFailed {
        stage: String,
        source_stage: String,
        reason: String,
        transaction: String,
    },

    #[error("Failed to write artifact to {}: {reason}", path.display())]
    ArtifactWrite { path: PathBuf, reason: String },
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_count_mismatch_display() {
        let err = TemplateError::ParameterCountMismatch {
            expected: 2,
            actual: 1,
            query: "{\"where\":\"PARAM\"}".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2 PARAM markers"));
        assert!(msg.contains("1 params"));
        assert!(msg.contains("where"));
    }

    #[test]
    fn test_resolution_error_names_path() {
        let err = TemplateError::Resolution {
            path: PathBuf::from("stage/rule.json"),
            reason: "not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("stage/rule.json"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_role_count_mismatch_display() {
        let err = ScenarioError::RoleCountMismatch {
            scenario: "owner_reads_own".to_string(),
            phase: Phase::YesQuery,
            roles: 2,
            entries: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("owner_reads_own"));
        assert!(msg.contains("yes-query"));
        assert!(msg.contains("2 roles"));
        assert!(msg.contains("3 entries"));
    }

    #[test]
    fn test_scenario_display_omits_payload() {
        let err = ScenarioError::MissingExpectedError {
            tx_id: "tx1".to_string(),
            transaction: "[{\"_id\":\"person\"}]".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("tx1"));
        assert!(!msg.contains("person"));
    }

    #[test]
    fn test_display_is_single_line() {
        let err = TesseraError::from(ScenarioError::TimedOut {
            tx_id: "tx9".to_string(),
            attempts: 30,
            waited: Duration::from_secs(3),
        });
        assert!(!err.to_string().contains('\n'));
    }

    #[test]
    fn test_tessera_error_from_variants() {
        let template = TesseraError::from(TemplateError::InvalidOperation {
            reason: "x".to_string(),
        });
        assert!(matches!(template, TesseraError::Template(_)));

        let ledger = TesseraError::from(LedgerError::Transport {
            reason: "refused".to_string(),
        });
        assert!(matches!(ledger, TesseraError::Ledger(_)));

        let config = TesseraError::from(ConfigError::UnknownTarget {
            target: "prod".to_string(),
        });
        assert!(matches!(config, TesseraError::Config(_)));

        let scenario = TesseraError::from(ScenarioError::Cancelled {
            tx_id: "t".to_string(),
        });
        assert!(matches!(scenario, TesseraError::Scenario(_)));
    }
}
