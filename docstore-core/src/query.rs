// src/query.rs
//! Filter matching: a recursive evaluator over the MongoDB-flavored filter
//! grammar (`$and`/`$or`/`$nor`/`$not` at the top level, dotted field paths
//! with array-mapping resolution, operator expressions or bare equality per
//! field).

pub mod operators;

use crate::document::Document;
use crate::error::{DocStoreError, Result};
use crate::query::operators::{eval_operator_expr, values_equal};
use serde_json::Value;

/// Whether every key of `obj` is an operator key (starts with `$`). Objects
/// that mix operator and non-operator keys, or contain none, are treated as
/// equality targets rather than operator expressions.
fn looks_like_operator_expr(obj: &serde_json::Map<String, Value>) -> bool {
    !obj.is_empty() && obj.keys().all(|k| k.starts_with('$'))
}

fn eq_match(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => false,
        Some(Value::Array(arr)) if !expected.is_array() => {
            arr.iter().any(|v| values_equal(v, expected))
        }
        Some(v) => values_equal(v, expected),
    }
}

/// Evaluate `filter` against `document`. Top-level keys starting with `$`
/// are logical operators; everything else is a field path paired with
/// either an operator-expression object or an equality constraint.
pub fn matches_filter(document: &Document, filter: &Value) -> Result<bool> {
    let obj = match filter.as_object() {
        Some(o) => o,
        None => {
            return Err(DocStoreError::ValidationError(
                "filter must be an object".to_string(),
            ))
        }
    };
    if obj.is_empty() {
        return Ok(true);
    }

    for (key, value) in obj {
        let ok = if key.starts_with('$') {
            match key.as_str() {
                "$and" => all_match(document, value)?,
                "$or" => any_match(document, value)?,
                "$nor" => !any_match(document, value)?,
                "$not" => !matches_filter(document, value)?,
                other => {
                    crate::log_warn!("ignoring unknown top-level operator {other}");
                    true
                }
            }
        } else {
            let actual = document.get_path(key);
            match value {
                Value::Object(cond) if looks_like_operator_expr(cond) => {
                    eval_operator_expr(actual.as_ref(), cond)?
                }
                other => eq_match(actual.as_ref(), other),
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters(value: &Value) -> Result<&Vec<Value>> {
    value.as_array().ok_or_else(|| {
        DocStoreError::ValidationError("$and/$or/$nor require an array of filters".to_string())
    })
}

fn all_match(document: &Document, value: &Value) -> Result<bool> {
    for f in sub_filters(value)? {
        if !matches_filter(document, f)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_match(document: &Document, value: &Value) -> Result<bool> {
    for f in sub_filters(value)? {
        if matches_filter(document, f)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn doc(fields: Value) -> Document {
        let mut map = HashMap::new();
        if let Value::Object(obj) = fields {
            for (k, v) in obj {
                map.insert(k, v);
            }
        }
        Document::new("x".into(), map)
    }

    #[test]
    fn empty_filter_matches_all() {
        let d = doc(json!({"a": 1}));
        assert!(matches_filter(&d, &json!({})).unwrap());
    }

    #[test]
    fn implicit_and_over_fields() {
        let d = doc(json!({"a": 1, "b": 2}));
        assert!(matches_filter(&d, &json!({"a": 1, "b": 2})).unwrap());
        assert!(!matches_filter(&d, &json!({"a": 1, "b": 3})).unwrap());
    }

    #[test]
    fn dotted_path_and_operator_expr() {
        let d = doc(json!({"address": {"city": "Szeged"}, "age": 30}));
        assert!(matches_filter(&d, &json!({"address.city": "Szeged"})).unwrap());
        assert!(matches_filter(&d, &json!({"age": {"$gte": 18}})).unwrap());
        assert!(!matches_filter(&d, &json!({"age": {"$gte": 40}})).unwrap());
    }

    #[test]
    fn top_level_and_or_nor() {
        let d = doc(json!({"a": 1, "b": 2}));
        assert!(matches_filter(&d, &json!({"$and": [{"a": 1}, {"b": 2}]})).unwrap());
        assert!(matches_filter(&d, &json!({"$or": [{"a": 99}, {"b": 2}]})).unwrap());
        assert!(matches_filter(&d, &json!({"$nor": [{"a": 99}, {"b": 99}]})).unwrap());
        assert!(!matches_filter(&d, &json!({"$nor": [{"a": 1}]})).unwrap());
    }

    #[test]
    fn top_level_not() {
        let d = doc(json!({"a": 1}));
        assert!(matches_filter(&d, &json!({"$not": {"a": 2}})).unwrap());
        assert!(!matches_filter(&d, &json!({"$not": {"a": 1}})).unwrap());
    }

    #[test]
    fn array_mapped_path_matches_nested_field() {
        let d = doc(json!({"items": [{"tag": "a"}, {"tag": "b"}]}));
        assert!(matches_filter(&d, &json!({"items.tag": "b"})).unwrap());
    }

    #[test]
    fn id_field_matches_by_name() {
        let d = doc(json!({}));
        assert!(matches_filter(&d, &json!({"id": "x"})).unwrap());
    }
}
