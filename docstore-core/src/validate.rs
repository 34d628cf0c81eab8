// src/validate.rs
//! Validation enforced at the façade before routing (§6): collection name
//! grammar, filter shape, and options keys/value types.

use crate::error::{DocStoreError, Result};
use crate::query::operators::OPERATOR_REGISTRY;
use serde_json::Value;

const MAX_NAME_LEN: usize = 64;

/// Non-empty, ≤64 chars, `[A-Za-z0-9_-]+`, first character alphabetic, no
/// leading `.`, no `..`, no path separators, no whitespace, no `<>:"|?*`.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(DocStoreError::ValidationError(format!(
            "collection name must be 1-{MAX_NAME_LEN} characters: {name}"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphabetic() {
        return Err(DocStoreError::ValidationError(format!(
            "collection name must start with a letter: {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DocStoreError::ValidationError(format!(
            "collection name must match [A-Za-z0-9_-]+: {name}"
        )));
    }
    Ok(())
}

/// Filters must be a non-null, non-list mapping; top-level `$` keys must be
/// a known logical operator; sub-filters recurse.
pub fn validate_filter(filter: &Value) -> Result<()> {
    let obj = filter
        .as_object()
        .ok_or_else(|| DocStoreError::ValidationError("filter must be an object".to_string()))?;
    for (key, value) in obj {
        if key.starts_with('$') {
            match key.as_str() {
                "$and" | "$or" | "$nor" => {
                    let arr = value.as_array().ok_or_else(|| {
                        DocStoreError::ValidationError(format!("{key} requires an array"))
                    })?;
                    for f in arr {
                        validate_filter(f)?;
                    }
                }
                "$not" => validate_filter(value)?,
                other => {
                    return Err(DocStoreError::ValidationError(format!(
                        "unknown top-level filter operator: {other}"
                    )))
                }
            }
        } else if let Value::Object(cond) = value {
            for op in cond.keys() {
                if op.starts_with('$') && op != "$options" && !OPERATOR_REGISTRY.contains_key(op.as_str())
                    && op != "$not"
                {
                    return Err(DocStoreError::ValidationError(format!(
                        "unknown operator: {op}"
                    )));
                }
            }
        }
    }
    Ok(())
}

const KNOWN_OPTION_KEYS: &[&str] = &[
    "sort", "skip", "limit", "fields", "page", "returnType", "maxReturn",
];
const KNOWN_RETURN_TYPES: &[&str] = &["count", "ids", "documents", "document", "id"];

/// Options keys restricted to the known set; `sort`/`fields` values in
/// `{1,-1,true,false}`; `skip` ≥ 0; `limit` ≥ 0; `page` > 0; `returnType`
/// known; `maxReturn` a non-negative integer.
pub fn validate_options(options: &Value) -> Result<()> {
    let obj = match options.as_object() {
        Some(o) => o,
        None => return Ok(()),
    };
    for key in obj.keys() {
        if !KNOWN_OPTION_KEYS.contains(&key.as_str()) {
            return Err(DocStoreError::ValidationError(format!(
                "unknown option key: {key}"
            )));
        }
    }
    if let Some(sort) = obj.get("sort").and_then(|v| v.as_object()) {
        for v in sort.values() {
            if !is_direction_value(v) {
                return Err(DocStoreError::ValidationError(
                    "sort values must be 1, -1, true, or false".to_string(),
                ));
            }
        }
    }
    if let Some(fields) = obj.get("fields").and_then(|v| v.as_object()) {
        for v in fields.values() {
            if !is_direction_value(v) {
                return Err(DocStoreError::ValidationError(
                    "fields values must be 1, -1, true, or false".to_string(),
                ));
            }
        }
    }
    if let Some(skip) = obj.get("skip") {
        if !skip.as_f64().map(|n| n >= 0.0).unwrap_or(false) {
            return Err(DocStoreError::ValidationError("skip must be >= 0".to_string()));
        }
    }
    if let Some(limit) = obj.get("limit") {
        if !limit.as_f64().map(|n| n >= 0.0).unwrap_or(false) {
            return Err(DocStoreError::ValidationError("limit must be >= 0".to_string()));
        }
    }
    if let Some(page) = obj.get("page") {
        if !page.as_f64().map(|n| n > 0.0).unwrap_or(false) {
            return Err(DocStoreError::ValidationError("page must be > 0".to_string()));
        }
    }
    if let Some(rt) = obj.get("returnType") {
        let s = rt
            .as_str()
            .ok_or_else(|| DocStoreError::ValidationError("returnType must be a string".to_string()))?;
        if !KNOWN_RETURN_TYPES.contains(&s) {
            return Err(DocStoreError::ValidationError(format!(
                "unknown returnType: {s}"
            )));
        }
    }
    if let Some(max_return) = obj.get("maxReturn") {
        if !max_return.as_u64().is_some() {
            return Err(DocStoreError::ValidationError(
                "maxReturn must be a non-negative integer".to_string(),
            ));
        }
    }
    Ok(())
}

fn is_direction_value(v: &Value) -> bool {
    matches!(v.as_i64(), Some(1) | Some(-1)) || matches!(v, Value::Bool(_))
}
