// src/update.rs
//! The declarative update interpreter: `$set`/`$unset`/`$inc`/`$push`/
//! `$pull`/`$addToSet`, including dotted paths and the `$each` modifier.

use crate::document::Document;
use crate::error::{DocStoreError, Result};
use crate::path;
use serde_json::Value;

/// Normalize a caller-supplied update: top-level keys starting with `$` are
/// already an "operator update"; anything else is a bare replace-fields
/// update, wrapped in `$set`.
pub fn normalize_update(update: &Value) -> Result<Value> {
    let obj = update
        .as_object()
        .ok_or_else(|| DocStoreError::ValidationError("update must be an object".to_string()))?;
    let is_operator_update = obj.keys().any(|k| k.starts_with('$'));
    if is_operator_update {
        Ok(update.clone())
    } else {
        let mut set = serde_json::Map::new();
        set.insert("$set".to_string(), update.clone());
        Ok(Value::Object(set))
    }
}

/// Apply a normalized update to `document` in place. Returns whether any
/// operator actually changed the document (callers use this to decide
/// whether to refresh `updatedAt` and mark the collection dirty).
pub fn apply_update(document: &mut Document, update: &Value) -> Result<bool> {
    let obj = update
        .as_object()
        .ok_or_else(|| DocStoreError::ValidationError("update must be an object".to_string()))?;

    let mut modified = false;
    for (op, fields) in obj {
        let field_values = fields.as_object().ok_or_else(|| {
            DocStoreError::ValidationError(format!("{op} requires an object of field paths"))
        })?;
        match op.as_str() {
            "$set" => {
                for (field, value) in field_values {
                    if field == "id" {
                        return Err(DocStoreError::IdMutation);
                    }
                    document.set_path(field, value.clone());
                    modified = true;
                }
            }
            "$unset" => {
                for (field, _) in field_values {
                    if field == "id" {
                        return Err(DocStoreError::IdMutation);
                    }
                    document.remove_path(field);
                    modified = true;
                }
            }
            "$inc" => {
                for (field, inc_value) in field_values {
                    let current = document.get_path(field);
                    let next = match (current.as_ref().and_then(Value::as_i64), inc_value.as_i64()) {
                        (Some(a), Some(b)) => Value::from(a + b),
                        _ => {
                            let a = current.as_ref().and_then(Value::as_f64).unwrap_or(0.0);
                            let b = inc_value.as_f64().ok_or_else(|| {
                                DocStoreError::ValidationError("$inc requires a numeric value".to_string())
                            })?;
                            Value::from(a + b)
                        }
                    };
                    document.set_path(field, next);
                    modified = true;
                }
            }
            "$push" => {
                for (field, spec) in field_values {
                    let mut array = match document.get_path(field) {
                        Some(Value::Array(arr)) => arr,
                        Some(_) => {
                            return Err(DocStoreError::ValidationError(format!(
                                "$push: field '{field}' is not an array"
                            )))
                        }
                        None => vec![],
                    };
                    let items = each_items(spec);
                    array.extend(items);
                    document.set_path(field, Value::Array(array));
                    modified = true;
                }
            }
            "$addToSet" => {
                for (field, spec) in field_values {
                    let mut array = match document.get_path(field) {
                        Some(Value::Array(arr)) => arr,
                        Some(_) => {
                            return Err(DocStoreError::ValidationError(format!(
                                "$addToSet: field '{field}' is not an array"
                            )))
                        }
                        None => vec![],
                    };
                    for item in each_items(spec) {
                        if !array.iter().any(|existing| existing == &item) {
                            array.push(item);
                        }
                    }
                    document.set_path(field, Value::Array(array));
                    // Runs (and refreshes updatedAt) even when every $each
                    // item was already present: a repeat call is a no-op on
                    // the array's contents, not on the document's timestamp.
                    modified = true;
                }
            }
            "$pull" => {
                for (field, condition) in field_values {
                    match document.get_path(field) {
                        Some(Value::Array(arr)) => {
                            let before = arr.len();
                            let filtered: Vec<Value> = arr
                                .into_iter()
                                .filter(|item| !pull_matches(item, condition))
                                .collect();
                            if filtered.len() != before {
                                modified = true;
                            }
                            document.set_path(field, Value::Array(filtered));
                        }
                        Some(_) => {
                            return Err(DocStoreError::ValidationError(format!(
                                "$pull: field '{field}' is not an array"
                            )))
                        }
                        None => {}
                    }
                }
            }
            other => {
                crate::log_warn!("ignoring unknown update operator {other}");
            }
        }
    }

    if modified {
        document.touch();
    }
    Ok(modified)
}

fn each_items(spec: &Value) -> Vec<Value> {
    if let Value::Object(modifiers) = spec {
        if let Some(each) = modifiers.get("$each") {
            return match each {
                Value::Array(arr) => arr.clone(),
                other => vec![other.clone()],
            };
        }
    }
    vec![spec.clone()]
}

/// `$pull` condition matching: either a literal value (retain elements not
/// equal to it) or `{$in: [...]}` (remove any member of that set).
fn pull_matches(item: &Value, condition: &Value) -> bool {
    if let Value::Object(obj) = condition {
        if let Some(Value::Array(set)) = obj.get("$in") {
            return set.iter().any(|v| v == item);
        }
    }
    item == condition
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
    fn normalize_wraps_bare_update_in_set() {
        let normalized = normalize_update(&json!({"n": 1})).unwrap();
        assert_eq!(normalized, json!({"$set": {"n": 1}}));
    }

    #[test]
    fn set_unset_inc() {
        let mut d = doc(json!({"n": 1}));
        apply_update(&mut d, &json!({"$set": {"name": "a"}})).unwrap();
        assert_eq!(d.fields.get("name"), Some(&json!("a")));
        apply_update(&mut d, &json!({"$inc": {"n": 5}})).unwrap();
        assert_eq!(d.fields.get("n"), Some(&json!(6)));
        apply_update(&mut d, &json!({"$unset": {"name": ""}})).unwrap();
        assert!(d.fields.get("name").is_none());
    }

    #[test]
    fn inc_missing_field_treated_as_zero() {
        let mut d = doc(json!({}));
        apply_update(&mut d, &json!({"$inc": {"n": 3}})).unwrap();
        assert_eq!(d.fields.get("n"), Some(&json!(3)));
    }

    #[test]
    fn push_creates_missing_array() {
        let mut d = doc(json!({}));
        apply_update(&mut d, &json!({"$push": {"tags": "a"}})).unwrap();
        assert_eq!(d.fields.get("tags"), Some(&json!(["a"])));
    }

    #[test]
    fn add_to_set_dedups_with_each() {
        let mut d = doc(json!({"tags": ["a", "b"]}));
        let modified = apply_update(
            &mut d,
            &json!({"$addToSet": {"tags": {"$each": ["b", "c"]}}}),
        )
        .unwrap();
        assert!(modified);
        assert_eq!(d.fields.get("tags"), Some(&json!(["a", "b", "c"])));

        let modified_again = apply_update(
            &mut d,
            &json!({"$addToSet": {"tags": {"$each": ["b", "c"]}}}),
        )
        .unwrap();
        // Still touches updatedAt even though nothing new was added.
        assert!(modified_again);
        assert_eq!(d.fields.get("tags"), Some(&json!(["a", "b", "c"])));
    }

    #[test]
    fn pull_literal_and_in_set() {
        let mut d = doc(json!({"n": [1, 2, 3, 4]}));
        apply_update(&mut d, &json!({"$pull": {"n": 2}})).unwrap();
        assert_eq!(d.fields.get("n"), Some(&json!([1, 3, 4])));

        apply_update(&mut d, &json!({"$pull": {"n": {"$in": [3, 4]}}})).unwrap();
        assert_eq!(d.fields.get("n"), Some(&json!([1])));
    }

    #[test]
    fn set_id_is_rejected() {
        let mut d = doc(json!({}));
        let err = apply_update(&mut d, &json!({"$set": {"id": "y"}})).unwrap_err();
        assert!(matches!(err, DocStoreError::IdMutation));
    }

    #[test]
    fn dotted_path_set() {
        let mut d = doc(json!({}));
        apply_update(&mut d, &json!({"$set": {"address.city": "Pécs"}})).unwrap();
        assert_eq!(d.get_path("address.city"), Some(json!("Pécs")));
    }
}
