// src/find_options.rs
//! Pure functions over a result set: sort, projection, limit/skip slicing.
//! None of this touches the collection cache; it operates on already
//! filtered `Vec<Value>` document snapshots.

use crate::value_utils::{compare_values_with_none, get_nested_value};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A projection spec: field path → include (`true`) or exclude (`false`).
/// Built from the caller's `1`/`-1`/`true`/`false` values.
pub type Projection = HashMap<String, bool>;

/// A sort spec: ordered list of (field path, direction); `1` ascending,
/// `-1` descending. Order matters: entries are evaluated in sequence as
/// tie-breaks.
pub type Sort = Vec<(String, i32)>;

/// Apply `sort` to `docs` in place. Stable; `undefined` (the path doesn't
/// resolve) orders strictly below every defined value, on every field.
pub fn apply_sort(docs: &mut [Value], sort: &Sort) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let va = get_nested_value(a, field);
            let vb = get_nested_value(b, field);
            let cmp = compare_values_with_none(va, vb);
            if cmp != Ordering::Equal {
                return if *direction >= 0 { cmp } else { cmp.reverse() };
            }
        }
        Ordering::Equal
    });
}

/// Apply a projection. Pure-include mode rebuilds a document with only the
/// requested (possibly dotted) paths, flat-keyed; pure-exclude mode clones
/// and removes the named top-level/dotted paths. Mixed inclusion/exclusion
/// (other than `id`, which may always be excluded alongside inclusions) is
/// unsupported: the document is returned unprojected and a warning logged.
pub fn apply_projection(doc: &Value, projection: &Projection) -> Value {
    if projection.is_empty() {
        return doc.clone();
    }

    let has_inclusions = projection.values().any(|&include| include);
    let has_non_id_exclusions = projection
        .iter()
        .any(|(field, &include)| !include && field != "id");

    if has_inclusions && has_non_id_exclusions {
        crate::log_warn!("mixed inclusion/exclusion projection is unsupported; returning document unprojected");
        return doc.clone();
    }

    let include_mode = has_inclusions;

    let Value::Object(obj) = doc else {
        return doc.clone();
    };

    let mut result = serde_json::Map::new();
    if include_mode {
        for (field, &include) in projection {
            if include {
                if let Some(value) = get_nested_value(doc, field) {
                    result.insert(field.clone(), value.clone());
                }
            }
        }
        if projection.get("id") != Some(&false) {
            if let Some(id) = obj.get("id") {
                result.insert("id".to_string(), id.clone());
            }
        }
    } else {
        for (key, value) in obj {
            if projection.get(key) != Some(&false) {
                result.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(result)
}

/// Apply a projection element-wise across every document in a result set.
pub fn apply_projection_all(docs: &[Value], projection: &Projection) -> Vec<Value> {
    docs.iter().map(|d| apply_projection(d, projection)).collect()
}

/// Slice `[skip, skip+limit)` out of `docs`. `limit = None` keeps everything
/// from `skip` onward.
pub fn apply_limit_skip(docs: Vec<Value>, limit: Option<usize>, skip: Option<usize>) -> Vec<Value> {
    let skip = skip.unwrap_or(0);
    if skip >= docs.len() {
        return Vec::new();
    }
    let end = match limit {
        Some(n) => (skip + n).min(docs.len()),
        None => docs.len(),
    };
    docs[skip..end].to_vec()
}
