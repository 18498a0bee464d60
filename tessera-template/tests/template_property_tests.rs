//! Property-Based Tests for Template Compilation
//!
//! Properties:
//! - Compilation is deterministic and insensitive to source key order
//! - Evaluating the compiled `(str ...)` expression reconstructs the
//!   serialized query with each marker replaced by its parameter
//! - Binding the marker itself reconstructs the serialized query exactly
//! - A parameter count that differs from the marker count is rejected
//! - Expansion is the identity on expanded operations

use proptest::prelude::*;
use serde_json::{json, Value};
use tessera_core::Operation;
use tessera_template::{
    compile_template, expand_operation, to_canonical_string, TemplateContext, MARKER,
};
use tessera_test_utils::assertions::assert_parameter_mismatch;
use tessera_test_utils::generators::{arb_param, arb_structured_query, arb_template};
use tessera_test_utils::marker_count;

// ============================================================================
// CODE READER
// ============================================================================

/// A piece of a `(str ...)` expression.
#[derive(Debug, PartialEq)]
enum Piece {
    Literal(String),
    Raw(String),
}

/// Read back a `(str ...)` expression: string literals are decoded, any
/// other token is kept raw.
fn read_str_expression(code: &str) -> Vec<Piece> {
    let mut rest = code
        .strip_prefix("(str")
        .and_then(|s| s.strip_suffix(')'))
        .expect("code is a (str ...) form");
    let mut pieces = Vec::new();

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if rest.starts_with('"') {
            let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<String>();
            let literal = stream.next().expect("a literal").expect("valid literal");
            let consumed = stream.byte_offset();
            pieces.push(Piece::Literal(literal));
            rest = &rest[consumed..];
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            pieces.push(Piece::Raw(rest[..end].to_string()));
            rest = &rest[end..];
        }
    }
    pieces
}

/// What the ledger computes: literals as-is, raw tokens replaced by `bind`.
fn evaluate(pieces: &[Piece], bind: impl Fn(&str) -> String) -> String {
    pieces
        .iter()
        .map(|piece| match piece {
            Piece::Literal(text) => text.clone(),
            Piece::Raw(token) => bind(token),
        })
        .collect()
}

fn param_text(param: &Value) -> String {
    match param {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_compilation_is_deterministic((query, params) in arb_template()) {
        let first = compile_template(&query, &params).unwrap().to_code();
        let second = compile_template(&query, &params).unwrap().to_code();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_key_order_does_not_matter((query, params) in arb_template()) {
        // Re-parse from pretty text: same content, independently built maps.
        let reparsed: Value = serde_json::from_str(&serde_json::to_string_pretty(&query).unwrap()).unwrap();
        let a = compile_template(&query, &params).unwrap();
        let b = compile_template(&reparsed, &params).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_fragments_alternate_with_params((query, params) in arb_template()) {
        let compiled = compile_template(&query, &params).unwrap();
        prop_assert_eq!(compiled.fragments().len(), params.len() + 1);

        let pieces = read_str_expression(&compiled.to_code());
        prop_assert_eq!(pieces.len(), 2 * params.len() + 1);
        for (index, piece) in pieces.iter().enumerate() {
            let is_literal = matches!(piece, Piece::Literal(_));
            prop_assert_eq!(is_literal, index % 2 == 0);
        }
    }

    #[test]
    fn prop_binding_marker_reconstructs_query((query, params) in arb_template()) {
        let compiled = compile_template(&query, &params).unwrap();
        let pieces = read_str_expression(&compiled.to_code());
        let rebuilt = evaluate(&pieces, |_| MARKER.to_string());
        prop_assert_eq!(rebuilt, to_canonical_string(&query));
    }

    #[test]
    fn prop_binding_params_substitutes_in_order((query, params) in arb_template()) {
        let compiled = compile_template(&query, &params).unwrap();
        let texts: Vec<String> = params.iter().map(param_text).collect();

        let mut expected = to_canonical_string(&query);
        for text in &texts {
            expected = expected.replacen(MARKER, text, 1);
        }

        let pieces = read_str_expression(&compiled.to_code());
        let evaluated = evaluate(&pieces, |token| token.to_string());
        prop_assert_eq!(&evaluated, &expected);
        prop_assert_eq!(compiled.interpolate(texts.as_slice()), Some(expected));
    }

    #[test]
    fn prop_extra_param_rejected(query in arb_structured_query(), extra in arb_param()) {
        let slots = marker_count(&query);
        let params: Vec<Value> = std::iter::repeat(extra).take(slots + 1).collect();
        assert_parameter_mismatch(&compile_template(&query, &params), slots, slots + 1);
    }

    #[test]
    fn prop_missing_param_rejected(query in arb_structured_query()) {
        let slots = marker_count(&query);
        prop_assume!(slots > 0);
        let params = vec![json!("?x"); slots - 1];
        assert_parameter_mismatch(&compile_template(&query, &params), slots, slots - 1);
    }

    #[test]
    fn prop_expansion_idempotent((query, params) in arb_template()) {
        let op = Operation::from_value(json!({
            "_id": "_fn",
            "params": params,
            "code_from_query": query
        })).unwrap();
        let context = TemplateContext::new(".");
        let once = expand_operation(op, &context).unwrap();
        let twice = expand_operation(once.clone(), &context).unwrap();
        prop_assert!(once.is_expanded());
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn test_reader_handles_escaped_fragments() {
    let compiled = compile_template(&json!({"say": "a \"b\" PARAM"}), &[json!("?who")]).unwrap();
    let pieces = read_str_expression(&compiled.to_code());
    assert_eq!(
        pieces,
        vec![
            Piece::Literal(r#"{"say":"a \"b\" "#.to_string()),
            Piece::Raw("?who".to_string()),
            Piece::Literal("\"}".to_string()),
        ]
    );
}
