// src/path.rs
//! Dotted-path resolution over a JSON tree, including the array-mapping
//! semantics the query engine relies on: when a path segment crosses a list
//! and the next segment is not a non-negative integer literal, the rest of
//! the path is evaluated against every element and the defined results are
//! flattened one level into a list.

use serde_json::{Map, Value};

fn is_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse::<usize>().ok()
}

/// Resolve `path` (dot-separated, no leading segment consumed yet) against
/// `value`. Returns `None` for "undefined" per the filter matcher's model.
pub fn resolve(value: &Value, path: &str) -> Option<Value> {
    resolve_segments(value, &path.split('.').collect::<Vec<_>>())
}

fn resolve_segments(value: &Value, segments: &[&str]) -> Option<Value> {
    if segments.is_empty() {
        return Some(value.clone());
    }
    let (head, tail) = (segments[0], &segments[1..]);
    match value {
        Value::Object(map) => map.get(head).and_then(|v| resolve_segments(v, tail)),
        Value::Array(arr) => {
            if let Some(idx) = is_index(head) {
                arr.get(idx).and_then(|v| resolve_segments(v, tail))
            } else {
                // Map the whole remaining path (including `head`) over each
                // element, flattening one level of array results.
                let mut out = Vec::new();
                for elem in arr {
                    if let Some(r) = resolve_segments(elem, segments) {
                        match r {
                            Value::Array(inner) => out.extend(inner),
                            other => out.push(other),
                        }
                    }
                }
                Some(Value::Array(out))
            }
        }
        _ => None,
    }
}

/// Write `value` at `path` inside `target`, creating intermediate objects as
/// needed. Array segments must be numeric and in bounds to navigate through
/// (this mirrors `$set`'s "create maps, not arrays" behavior).
pub fn set_at(target: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    set_segments(target, &segments, value);
}

fn set_segments(target: &mut Value, segments: &[&str], value: Value) {
    if segments.is_empty() {
        return;
    }
    if segments.len() == 1 {
        match target {
            Value::Object(map) => {
                map.insert(segments[0].to_string(), value);
            }
            Value::Array(arr) => {
                if let Some(idx) = is_index(segments[0]) {
                    if idx < arr.len() {
                        arr[idx] = value;
                    } else {
                        // extend with nulls up to idx, matching JS array semantics
                        arr.resize(idx, Value::Null);
                        arr.push(value);
                    }
                }
            }
            _ => {
                let mut map = Map::new();
                map.insert(segments[0].to_string(), value);
                *target = Value::Object(map);
            }
        }
        return;
    }
    match target {
        Value::Object(map) => {
            let entry = map
                .entry(segments[0].to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_segments(entry, &segments[1..], value);
        }
        Value::Array(arr) => {
            if let Some(idx) = is_index(segments[0]) {
                if idx >= arr.len() {
                    arr.resize(idx + 1, Value::Null);
                }
                set_segments(&mut arr[idx], &segments[1..], value);
            }
        }
        _ => {
            let mut nested = Map::new();
            let mut placeholder = Value::Object(Map::new());
            set_segments(&mut placeholder, &segments[1..], value);
            nested.insert(segments[0].to_string(), placeholder);
            *target = Value::Object(nested);
        }
    }
}

/// Remove the value at `path` inside `target`. Does not descend through
/// lists when the next segment isn't numeric (matches the codec's known
/// exclusion-projection limitation, see SPEC_FULL.md §4.B).
pub fn remove_at(target: &mut Value, path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    remove_segments(target, &segments)
}

fn remove_segments(target: &mut Value, segments: &[&str]) -> Option<Value> {
    if segments.is_empty() {
        return None;
    }
    if segments.len() == 1 {
        return match target {
            Value::Object(map) => map.remove(segments[0]),
            Value::Array(arr) => {
                let idx = is_index(segments[0])?;
                if idx < arr.len() {
                    Some(arr.remove(idx))
                } else {
                    None
                }
            }
            _ => None,
        };
    }
    match target {
        Value::Object(map) => {
            let next = map.get_mut(segments[0])?;
            remove_segments(next, &segments[1..])
        }
        Value::Array(arr) => {
            let idx = is_index(segments[0])?;
            let next = arr.get_mut(idx)?;
            remove_segments(next, &segments[1..])
        }
        _ => None,
    }
}
