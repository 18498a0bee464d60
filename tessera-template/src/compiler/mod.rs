//! Template Compiler - Structured Query to Executable Code
//!
//! Turns template operations into final operations. The only substitution
//! primitive is ordered parameter interpolation:
//!
//! ```text
//! {"where": [["?u", "_user/auth", "PARAM"]]}      params: ["(?auth_id)"]
//!     ↓ canonical serialization
//! {"where":[["?u","_user/auth","PARAM"]]}
//!     ↓ split on PARAM
//! ["{\"where\":[[\"?u\",\"_user/auth\",\"", "\"]]}"]
//!     ↓ fragments as string literals, params raw
//! (str "{\"where\":[[\"?u\",\"_user/auth\",\"" (?auth_id) "\"]]}")
//! ```
//!
//! Parameters are evaluated by the ledger at run time; they never pass through
//! the query serializer, so nothing in a parameter can change the query's
//! structure. The marker token must not appear in legitimate query content.

pub mod canonical;

use canonical::{string_literal, to_canonical_string};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tessera_core::{CodeSource, Operation, TemplateError, Transaction};

pub use tessera_core::operation::PARAM_MARKER as MARKER;

/// Extension of files written directly in the ledger's code language.
pub const CODE_FILE_EXTENSION: &str = "clj";

// ============================================================================
// COMPILED TEMPLATE
// ============================================================================

/// A structured query split at its parameter slots.
///
/// Invariant: `fragments.len() == params.len() + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    fragments: Vec<String>,
    params: Vec<String>,
}

impl CompiledTemplate {
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Parameter expressions as they appear in the code.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Render the concatenation expression.
    pub fn to_code(&self) -> String {
        let mut code = String::from("(str");
        for (index, fragment) in self.fragments.iter().enumerate() {
            if index > 0 {
                code.push(' ');
                code.push_str(&self.params[index - 1]);
            }
            code.push(' ');
            code.push_str(&string_literal(fragment));
        }
        code.push(')');
        code
    }

    /// Concatenate the fragments with `values` bound to the parameter slots,
    /// which is what the ledger computes when it evaluates [`to_code`].
    /// Returns `None` when `values` does not fill every slot exactly.
    ///
    /// [`to_code`]: CompiledTemplate::to_code
    pub fn interpolate<S: AsRef<str>>(&self, values: &[S]) -> Option<String> {
        if values.len() != self.params.len() {
            return None;
        }
        let mut out = String::new();
        for (index, fragment) in self.fragments.iter().enumerate() {
            if index > 0 {
                out.push_str(values[index - 1].as_ref());
            }
            out.push_str(fragment);
        }
        Some(out)
    }
}

/// Compile a structured query and its parameters.
pub fn compile_template(query: &Value, params: &[Value]) -> Result<CompiledTemplate, TemplateError> {
    let serialized = to_canonical_string(query);
    let fragments: Vec<String> = serialized.split(MARKER).map(str::to_owned).collect();
    let expected = fragments.len() - 1;

    if expected != params.len() {
        return Err(TemplateError::ParameterCountMismatch {
            expected,
            actual: params.len(),
            query: serialized,
        });
    }

    Ok(CompiledTemplate {
        fragments,
        params: params.iter().map(param_expression).collect(),
    })
}

/// A string parameter is already an expression; anything else is embedded
/// as its JSON text.
fn param_expression(param: &Value) -> String {
    match param {
        Value::String(expr) => expr.clone(),
        other => to_canonical_string(other),
    }
}

// ============================================================================
// OPERATION EXPANSION
// ============================================================================

/// Where `code_expand` file names are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    component_dir: PathBuf,
}

impl TemplateContext {
    pub fn new(component_dir: impl Into<PathBuf>) -> Self {
        Self {
            component_dir: component_dir.into(),
        }
    }

    pub fn component_dir(&self) -> &Path {
        &self.component_dir
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        self.component_dir.join(file)
    }
}

/// Expand one operation. Operations without a template form pass through
/// unchanged.
pub fn expand_operation(
    operation: Operation,
    context: &TemplateContext,
) -> Result<Operation, TemplateError> {
    let Operation { fields, code } = operation;
    let code = match code {
        Some(CodeSource::FileTemplate { path, params }) => {
            Some(CodeSource::Verbatim(resolve_file(context, &path, &params)?))
        }
        Some(CodeSource::InlineTemplate { query, params }) => {
            Some(CodeSource::Verbatim(compile_template(&query, &params)?.to_code()))
        }
        other => other,
    };
    Ok(Operation { fields, code })
}

/// Expand every operation of a transaction, keeping execution order.
pub fn expand_transaction(
    transaction: Transaction,
    context: &TemplateContext,
) -> Result<Transaction, TemplateError> {
    transaction
        .into_iter()
        .map(|operation| expand_operation(operation, context))
        .collect()
}

fn resolve_file(
    context: &TemplateContext,
    file: &Path,
    params: &[Value],
) -> Result<String, TemplateError> {
    let path = context.resolve(file);
    let contents = std::fs::read_to_string(&path).map_err(|e| TemplateError::Resolution {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let is_code = path
        .extension()
        .is_some_and(|ext| ext == CODE_FILE_EXTENSION);
    if is_code {
        tracing::debug!(path = %path.display(), "Using code file verbatim");
        return Ok(contents.trim().to_string());
    }

    let query: Value = serde_json::from_str(&contents).map_err(|e| TemplateError::Resolution {
        path: path.clone(),
        reason: format!("malformed query document: {}", e),
    })?;
    tracing::debug!(path = %path.display(), params = params.len(), "Compiling query template");
    match compile_template(&query, params) {
        Ok(compiled) => Ok(compiled.to_code()),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Query template failed to compile");
            Err(TemplateError::InFile {
                path,
                source: Box::new(e),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_without_markers() {
        let compiled = compile_template(&json!({"select": ["*"]}), &[]).unwrap();
        assert_eq!(compiled.fragments().len(), 1);
        assert_eq!(compiled.to_code(), r#"(str "{\"select\":[\"*\"]}")"#);
    }

    #[test]
    fn test_compile_single_param() {
        let query = json!({"where": [["?u", "_user/auth", "PARAM"]]});
        let compiled = compile_template(&query, &[json!("(?auth_id)")]).unwrap();
        assert_eq!(
            compiled.to_code(),
            r#"(str "{\"where\":[[\"?u\",\"_user/auth\",\"" (?auth_id) "\"]]}")"#
        );
    }

    #[test]
    fn test_non_string_param_embedded_as_json() {
        let compiled = compile_template(&json!({"limit": "PARAM"}), &[json!(5)]).unwrap();
        assert_eq!(compiled.params(), &["5".to_string()]);
    }

    #[test]
    fn test_adjacent_markers_keep_empty_fragment() {
        let compiled = compile_template(&json!("PARAMPARAM"), &[json!("a"), json!("b")]).unwrap();
        assert_eq!(compiled.fragments(), &["\"", "", "\""]);
        assert_eq!(compiled.to_code(), r#"(str "\"" a "" b "\"")"#);
    }

    #[test]
    fn test_mismatch_reports_counts_and_query() {
        let err = compile_template(&json!(["PARAM", "PARAM"]), &[json!("x")]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::ParameterCountMismatch {
                expected: 2,
                actual: 1,
                query: r#"["PARAM","PARAM"]"#.to_string(),
            }
        );
    }

    #[test]
    fn test_interpolate_requires_all_slots() {
        let compiled = compile_template(&json!(["PARAM"]), &[json!("x")]).unwrap();
        assert_eq!(compiled.interpolate::<&str>(&[]), None);
        assert_eq!(compiled.interpolate(&["1"]).as_deref(), Some(r#"["1"]"#));
    }

    #[test]
    fn test_expand_inline_template() {
        let op = Operation::from_value(json!({
            "_id": "_fn",
            "name": "own",
            "params": ["?me"],
            "code_from_query": {"select": "PARAM"}
        }))
        .unwrap();
        let expanded = expand_operation(op, &TemplateContext::new(".")).unwrap();
        assert!(expanded.is_expanded());
        assert_eq!(
            expanded.to_value(),
            json!({
                "_id": "_fn",
                "name": "own",
                "params": ["?me"],
                "code": r#"(str "{\"select\":\"" ?me "\"}")"#
            })
        );
    }

    #[test]
    fn test_expand_is_identity_on_expanded() {
        let op = Operation::from_value(json!({"_id": "_fn", "code": "(== 1 1)"})).unwrap();
        let expanded = expand_operation(op.clone(), &TemplateContext::new(".")).unwrap();
        assert_eq!(expanded, op);
    }

    #[test]
    fn test_expand_missing_file_names_path() {
        let op = Operation::from_value(json!({"code_expand": "missing.json"})).unwrap();
        let err = expand_operation(op, &TemplateContext::new("/nonexistent-dir")).unwrap_err();
        match err {
            TemplateError::Resolution { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent-dir/missing.json"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_file_param_mismatch_names_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rule.json"), r#"{"where": "PARAM"}"#).unwrap();
        let op = Operation::from_value(json!({"_id": "_fn", "code_expand": "rule.json"})).unwrap();

        let err = expand_operation(op, &TemplateContext::new(dir.path())).unwrap_err();
        assert!(err.to_string().contains("rule.json"));
        match err {
            TemplateError::InFile { path, source } => {
                assert!(path.ends_with("rule.json"));
                assert!(matches!(
                    *source,
                    TemplateError::ParameterCountMismatch { expected: 1, actual: 0, .. }
                ));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
