//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - Proptest generators for structured queries and parameters
//! - On-disk project trees for assembler and harness tests
//! - Custom assertions for Tessera error variants

// Re-export the in-memory ledger from its source crate
pub use tessera_ledger::{InMemoryLedger, QueryRequest, Submission};

// Re-export core types for convenience
pub use tessera_core::{
    BuildTarget, ConfigError, DatabaseId, HarnessConfig, KeyDescriptor, LedgerError, Phase,
    PollPolicy, ScenarioError, TemplateError, TesseraError, TesseraResult, TxId,
};

use serde_json::Value;
use tessera_core::operation::PARAM_MARKER;

/// Number of parameter slots in a structured query.
pub fn marker_count(query: &Value) -> usize {
    query.to_string().matches(PARAM_MARKER).count()
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for template inputs.

    use super::*;
    use proptest::prelude::*;

    /// Lowercase text with characters that need escaping; never contains the
    /// marker.
    pub fn arb_plain_string() -> impl Strategy<Value = String> {
        "[a-z?_/\"\\\\ ]{0,8}"
    }

    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            arb_plain_string().prop_map(Value::String),
        ]
    }

    /// A scalar, or the marker itself.
    pub fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            4 => arb_scalar(),
            1 => Just(Value::String(PARAM_MARKER.to_string())),
        ]
    }

    /// Nested objects and lists with markers at arbitrary leaves.
    pub fn arb_structured_query() -> impl Strategy<Value = Value> {
        arb_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_/]{1,6}", inner, 0..4)
                    .prop_map(|entries| Value::Object(entries.into_iter().collect())),
            ]
        })
    }

    /// A parameter as written in an operation's `params`.
    pub fn arb_param() -> impl Strategy<Value = Value> {
        prop_oneof![
            "\\?[a-z]{1,6}".prop_map(Value::String),
            "\\(\\?[a-z]{1,4}\\)".prop_map(Value::String),
            any::<i32>().prop_map(Value::from),
        ]
    }

    /// A structured query with exactly as many params as it has markers.
    pub fn arb_template() -> impl Strategy<Value = (Value, Vec<Value>)> {
        arb_structured_query().prop_flat_map(|query| {
            let slots = marker_count(&query);
            (Just(query), prop::collection::vec(arb_param(), slots))
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built keys, configs and on-disk project trees.

    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;
    use tessera_core::{LedgerSettings, MarkerSettings, PollSettings};

    pub const NETWORK: &str = "test";

    /// The n-th test key; account id `user<n>`.
    pub fn key(n: usize) -> KeyDescriptor {
        KeyDescriptor::new(format!("private-{}", n), format!("user{}", n))
    }

    pub fn root_key() -> KeyDescriptor {
        KeyDescriptor::new("private-root", "root")
    }

    /// Fast polling with a deadline, for paused-clock tests.
    pub fn fast_policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(10),
            notice_every: 10,
            deadline: Some(Duration::from_secs(5)),
        }
    }

    pub fn test_config() -> HarnessConfig {
        HarnessConfig {
            ledger: LedgerSettings {
                endpoint: "http://localhost:8090".to_string(),
                network: NETWORK.to_string(),
                request_timeout_ms: 5_000,
            },
            root_key: root_key(),
            polling: PollSettings {
                interval_ms: 10,
                notice_every: 10,
                deadline_ms: Some(5_000),
            },
            markers: MarkerSettings::default(),
        }
    }

    /// A source tree in a temporary directory.
    pub struct ProjectTree {
        dir: TempDir,
    }

    impl Default for ProjectTree {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ProjectTree {
        pub fn new() -> Self {
            Self {
                dir: tempfile::tempdir().expect("create temp dir"),
            }
        }

        pub fn root(&self) -> &Path {
            self.dir.path()
        }

        pub fn path(&self, relative: &str) -> PathBuf {
            self.dir.path().join(relative)
        }

        /// Write `contents` to `relative`, creating parent directories.
        pub fn file(self, relative: &str, contents: &str) -> Self {
            let path = self.path(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create fixture dir");
            }
            fs::write(&path, contents).expect("write fixture file");
            self
        }

        pub fn json(self, relative: &str, value: &Value) -> Self {
            let text = serde_json::to_string_pretty(value).expect("serialize fixture");
            self.file(relative, &text)
        }

        /// `build.json`
        pub fn build(self, targets: Value) -> Self {
            self.json("build.json", &targets)
        }

        /// `<stage>/main.json`
        pub fn stage(self, stage: &str, operations: Value) -> Self {
            self.json(&format!("{}/main.json", stage), &operations)
        }

        /// `<stage>.json`, used without expansion.
        pub fn verbatim_stage(self, stage: &str, operations: Value) -> Self {
            self.json(&format!("{}.json", stage), &operations)
        }

        /// `<stage>/test.json`
        pub fn scenarios(self, stage: &str, names: &[&str]) -> Self {
            self.json(&format!("{}/test.json", stage), &Value::from(names.to_vec()))
        }

        /// `<stage>/<scenario>/user.json`
        pub fn users(self, stage: &str, scenario: &str, keys: &[KeyDescriptor], roles: Value) -> Self {
            let mut table = match roles {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            table.insert(
                "keys".to_string(),
                serde_json::to_value(keys).expect("serialize keys"),
            );
            self.json(&format!("{}/{}/user.json", stage, scenario), &Value::Object(table))
        }

        /// `<stage>/<scenario>/<phase file>`
        pub fn phase(self, stage: &str, scenario: &str, phase: Phase, entries: Value) -> Self {
            self.json(&format!("{}/{}/{}", stage, scenario, phase.file_name()), &entries)
        }

        pub fn target(&self, name: &str, stages: &[&str]) -> BuildTarget {
            BuildTarget {
                name: name.to_string(),
                stages: stages.iter().map(|s| s.to_string()).collect(),
            }
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Tessera-specific error variants.

    use super::*;
    use std::fmt::Debug;

    /// Assert a Scenario error and hand it back for closer inspection.
    #[track_caller]
    pub fn assert_scenario_error<T: Debug>(result: &TesseraResult<T>) -> &ScenarioError {
        match result {
            Err(TesseraError::Scenario(error)) => error,
            other => panic!("Expected Scenario error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_template_error<T: Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Template(_)) => {}
            other => panic!("Expected Template error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_role_count_mismatch<T: Debug>(
        result: &TesseraResult<T>,
        scenario: &str,
        phase: Phase,
        roles: usize,
        entries: usize,
    ) {
        match result {
            Err(TesseraError::Scenario(ScenarioError::RoleCountMismatch {
                scenario: s,
                phase: p,
                roles: r,
                entries: e,
            })) => {
                assert_eq!(s, scenario, "Wrong scenario in RoleCountMismatch");
                assert_eq!(*p, phase, "Wrong phase in RoleCountMismatch");
                assert_eq!((*r, *e), (roles, entries), "Wrong counts in RoleCountMismatch");
            }
            other => panic!(
                "Expected RoleCountMismatch({}, {}, {}, {}), got: {:?}",
                scenario, phase, roles, entries, other
            ),
        }
    }

    #[track_caller]
    pub fn assert_parameter_mismatch<T: Debug>(
        result: &Result<T, TemplateError>,
        expected: usize,
        actual: usize,
    ) {
        match result {
            Err(TemplateError::ParameterCountMismatch {
                expected: e,
                actual: a,
                ..
            }) => {
                assert_eq!(*e, expected, "Wrong expected count");
                assert_eq!(*a, actual, "Wrong actual count");
            }
            other => panic!(
                "Expected ParameterCountMismatch({}, {}), got: {:?}",
                expected, actual, other
            ),
        }
    }
}
