//! Operation model
//!
//! An operation is one entry of a ledger transaction: a JSON object whose
//! keys are the action payload, plus at most one code-producing key. Source
//! files express code in one of three forms:
//!
//! ```text
//! "code":            "(== 1 1)"                 -> CodeSource::Verbatim
//! "code_expand":     "owner_rule.json"          -> CodeSource::FileTemplate
//! "code_from_query": {"select": ..., "where": ..} -> CodeSource::InlineTemplate
//! ```
//!
//! The template compiler normalizes the two template forms to `Verbatim`
//! before anything reaches the ledger.

use crate::error::TemplateError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const COMMENT_KEY: &str = "COMMENT";
pub const CODE_KEY: &str = "code";
pub const CODE_EXPAND_KEY: &str = "code_expand";
pub const CODE_FROM_QUERY_KEY: &str = "code_from_query";
pub const PARAMS_KEY: &str = "params";

/// Literal token marking a parameter slot in a structured query.
pub const PARAM_MARKER: &str = "PARAM";

/// Where an operation's code comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeSource {
    /// Final code, executed as-is.
    Verbatim(String),
    /// Code loaded from a file relative to the component directory.
    FileTemplate { path: PathBuf, params: Vec<Value> },
    /// Code compiled from an inline structured query.
    InlineTemplate { query: Value, params: Vec<Value> },
}

/// A single transaction operation.
///
/// `params` stays in `fields`: it is a stored attribute of function records,
/// and the template forms read their substitution values from it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Operation {
    pub fields: Map<String, Value>,
    pub code: Option<CodeSource>,
}

/// An ordered list of operations executed as one unit.
pub type Transaction = Vec<Operation>;

impl Operation {
    /// Build an operation from a raw JSON entry, dropping `COMMENT`.
    pub fn from_value(value: Value) -> Result<Self, TemplateError> {
        let mut fields = match value {
            Value::Object(map) => map,
            other => {
                return Err(TemplateError::InvalidOperation {
                    reason: format!("expected a JSON object, got {}", json_kind(&other)),
                })
            }
        };

        fields.remove(COMMENT_KEY);
        let verbatim = fields.remove(CODE_KEY);
        let file = fields.remove(CODE_EXPAND_KEY);
        let inline = fields.remove(CODE_FROM_QUERY_KEY);

        let code = match (verbatim, file, inline) {
            (None, None, None) => None,
            (Some(Value::String(code)), None, None) => Some(CodeSource::Verbatim(code)),
            (Some(other), None, None) => {
                return Err(TemplateError::InvalidOperation {
                    reason: format!("'{}' must be a string, got {}", CODE_KEY, json_kind(&other)),
                })
            }
            (None, Some(Value::String(path)), None) => Some(CodeSource::FileTemplate {
                path: PathBuf::from(path),
                params: template_params(&fields)?,
            }),
            (None, Some(other), None) => {
                return Err(TemplateError::InvalidOperation {
                    reason: format!(
                        "'{}' must be a file name, got {}",
                        CODE_EXPAND_KEY,
                        json_kind(&other)
                    ),
                })
            }
            (None, None, Some(query)) => Some(CodeSource::InlineTemplate {
                query,
                params: template_params(&fields)?,
            }),
            _ => {
                return Err(TemplateError::InvalidOperation {
                    reason: format!(
                        "only one of '{}', '{}' and '{}' may be present",
                        CODE_KEY, CODE_EXPAND_KEY, CODE_FROM_QUERY_KEY
                    ),
                })
            }
        };

        Ok(Self { fields, code })
    }

    /// Render back to the JSON shape the ledger (or a source file) uses.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        match &self.code {
            None => {}
            Some(CodeSource::Verbatim(code)) => {
                map.insert(CODE_KEY.to_string(), Value::String(code.clone()));
            }
            Some(CodeSource::FileTemplate { path, .. }) => {
                map.insert(
                    CODE_EXPAND_KEY.to_string(),
                    Value::String(path.to_string_lossy().into_owned()),
                );
            }
            Some(CodeSource::InlineTemplate { query, .. }) => {
                map.insert(CODE_FROM_QUERY_KEY.to_string(), query.clone());
            }
        }
        Value::Object(map)
    }

    /// True when no template form remains.
    pub fn is_expanded(&self) -> bool {
        matches!(self.code, None | Some(CodeSource::Verbatim(_)))
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Operation::from_value(value).map_err(D::Error::custom)
    }
}

fn template_params(fields: &Map<String, Value>) -> Result<Vec<Value>, TemplateError> {
    match fields.get(PARAMS_KEY) {
        None => Ok(Vec::new()),
        Some(Value::Array(params)) => Ok(params.clone()),
        Some(other) => Err(TemplateError::InvalidOperation {
            reason: format!("'{}' must be a list, got {}", PARAMS_KEY, json_kind(other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Parse a transaction file body: a JSON list of operations.
pub fn parse_transaction(value: Value) -> Result<Transaction, TemplateError> {
    match value {
        Value::Array(entries) => entries.into_iter().map(Operation::from_value).collect(),
        other => Err(TemplateError::InvalidOperation {
            reason: format!("expected a list of operations, got {}", json_kind(&other)),
        }),
    }
}

pub fn transaction_to_value(transaction: &[Operation]) -> Value {
    Value::Array(transaction.iter().map(Operation::to_value).collect())
}

/// Remove `COMMENT` from an entry, or from every entry of a list.
///
/// Only the top level of each entry is touched; a `COMMENT` key nested inside
/// a query is query content.
pub fn strip_comments(value: &Value) -> Value {
    match value {
        Value::Array(entries) => Value::Array(entries.iter().map(strip_entry).collect()),
        other => strip_entry(other),
    }
}

fn strip_entry(entry: &Value) -> Value {
    match entry {
        Value::Object(map) => {
            let mut map = map.clone();
            map.remove(COMMENT_KEY);
            Value::Object(map)
        }
        other => other.clone(),
    }
}
