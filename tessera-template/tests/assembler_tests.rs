//! Integration tests for stage assembly
//!
//! Tests verify:
//! - Verbatim stage files win over template directories
//! - `code_expand` resolves `.clj` files verbatim and JSON files as queries
//! - Missing template files name the path that was tried
//! - Reassembly is byte-identical
//! - Stage order is preserved in the flat artifact

use serde_json::{json, Value};
use tessera_template::{artifact_digest, flatten, render_artifact, BuildAssembler};
use tessera_core::{transaction_to_value, TemplateError};
use tessera_test_utils::fixtures::ProjectTree;

fn roles_stage() -> Value {
    json!([
        {
            "_id": "_fn$ownsRecord",
            "name": "ownsRecord",
            "params": ["?auth_id"],
            "code_expand": "owns_record.json",
            "COMMENT": "owner check"
        },
        {
            "_id": "_fn$isAdmin",
            "name": "isAdmin",
            "code_expand": "is_admin.clj"
        },
        {
            "_id": "_rule$read",
            "fns": ["_fn$ownsRecord"]
        }
    ])
}

fn project() -> ProjectTree {
    ProjectTree::new()
        .build(json!({"full": ["base", "roles"]}))
        .verbatim_stage("base", json!([
            {"_id": "_collection", "name": "person", "COMMENT": "people"}
        ]))
        .stage("roles", roles_stage())
        .file(
            "roles/owns_record.json",
            r#"{"where": [["?r", "person/owner", "PARAM"]], "select": "?r"}"#,
        )
        .file("roles/is_admin.clj", "  (contains? (?roles) \"admin\")\n")
}

#[test]
fn test_template_stage_expands_both_forms() {
    let tree = project();
    let artifact = BuildAssembler::new(tree.root()).assemble_stage("roles").unwrap();
    let value = artifact.to_value();

    assert_eq!(
        value[0]["code"],
        json!(r#"(str "{\"select\":\"?r\",\"where\":[[\"?r\",\"person/owner\",\"" ?auth_id "\"]]}")"#)
    );
    assert_eq!(value[0]["params"], json!(["?auth_id"]));
    assert!(value[0].get("COMMENT").is_none());
    assert!(value[0].get("code_expand").is_none());

    assert_eq!(value[1]["code"], json!("(contains? (?roles) \"admin\")"));
    assert_eq!(value[2], json!({"_id": "_rule$read", "fns": ["_fn$ownsRecord"]}));
}

#[test]
fn test_verbatim_stage_not_expanded() {
    let tree = ProjectTree::new().verbatim_stage(
        "raw",
        json!([{"_id": "_fn", "code_expand": "kept.json", "COMMENT": "x"}]),
    );
    let artifact = BuildAssembler::new(tree.root()).assemble_stage("raw").unwrap();
    assert_eq!(
        artifact.to_value(),
        json!([{"_id": "_fn", "code_expand": "kept.json"}])
    );
}

#[test]
fn test_missing_code_file_names_path() {
    let tree = ProjectTree::new().stage(
        "broken",
        json!([{"_id": "_fn", "code_expand": "absent.json"}]),
    );
    let err = BuildAssembler::new(tree.root())
        .assemble_stage("broken")
        .unwrap_err();
    match err {
        TemplateError::Resolution { path, .. } => {
            assert_eq!(path, tree.path("broken/absent.json"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_parameter_mismatch_in_stage() {
    let tree = ProjectTree::new().stage(
        "bad",
        json!([{"_id": "_fn", "params": [], "code_from_query": {"where": "PARAM"}}]),
    );
    let err = BuildAssembler::new(tree.root()).assemble_stage("bad").unwrap_err();
    assert!(matches!(
        err,
        TemplateError::ParameterCountMismatch { expected: 1, actual: 0, .. }
    ));
}

#[test]
fn test_reassembly_is_byte_identical() {
    let tree = project();
    let stages = vec!["base".to_string(), "roles".to_string()];
    let assembler = BuildAssembler::new(tree.root());

    let first = assembler.assemble(&stages).unwrap();
    let second = assembler.assemble(&stages).unwrap();
    assert_eq!(render_artifact(&first), render_artifact(&second));
    assert_eq!(artifact_digest(&first), artifact_digest(&second));
}

#[test]
fn test_flat_artifact_follows_stage_order() {
    let tree = project();
    let stages = vec!["base".to_string(), "roles".to_string()];
    let artifacts = BuildAssembler::new(tree.root()).assemble(&stages).unwrap();

    let flat = transaction_to_value(&flatten(&artifacts));
    let ids: Vec<&str> = flat
        .as_array()
        .unwrap()
        .iter()
        .map(|op| op["_id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec!["_collection", "_fn$ownsRecord", "_fn$isAdmin", "_rule$read"]
    );

    let rendered: Value = serde_json::from_str(&render_artifact(&artifacts)).unwrap();
    assert_eq!(rendered, flat);
}

#[test]
fn test_malformed_main_reports_path() {
    let tree = ProjectTree::new().file("odd/main.json", "{not json");
    let err = BuildAssembler::new(tree.root()).assemble_stage("odd").unwrap_err();
    assert!(err.to_string().contains("main.json"));
}
