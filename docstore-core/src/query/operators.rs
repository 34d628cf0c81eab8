// src/query/operators.rs
//! Operator expressions evaluated against a resolved field value.
//!
//! Each operator is a small `OperatorMatcher` registered by name in a
//! lazily-built registry, the same strategy-pattern shape the rest of this
//! crate's query layer uses: add an operator by writing a struct and a
//! registry entry, not by growing a dispatch match arm.

use crate::error::{DocStoreError, Result};
use crate::log_warn;
use crate::value_utils::compare_values;
use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// An operator expression matcher. `actual` is the resolved field value
/// (`None` means the path resolved to undefined); `expected` is the value
/// paired with the operator in the filter.
pub trait OperatorMatcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool>;
}

lazy_static! {
    static ref REGEX_CACHE: Mutex<LruCache<String, Regex>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(128).unwrap()));
}

fn build_regex_pattern(pattern: &str, options: &str) -> String {
    let mut flags = String::new();
    for c in options.chars() {
        if matches!(c, 'i' | 'm' | 's' | 'x') {
            flags.push(c);
        }
    }
    if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{flags}){pattern}")
    }
}

fn get_or_compile_regex(pattern: &str, options: &str) -> Result<Regex> {
    let cache_key = format!("{options}\u{0}{pattern}");
    let mut cache = REGEX_CACHE.lock().unwrap();
    if let Some(re) = cache.get(&cache_key) {
        return Ok(re.clone());
    }
    let full_pattern = build_regex_pattern(pattern, options);
    let re = Regex::new(&full_pattern)
        .map_err(|e| DocStoreError::ValidationError(format!("invalid $regex pattern: {e}")))?;
    cache.put(cache_key, re.clone());
    Ok(re)
}

pub fn regex_match_with_options(value: &str, pattern: &str, options: &str) -> Result<bool> {
    let re = get_or_compile_regex(pattern, options)?;
    Ok(re.is_match(value))
}

/// Evaluate a `$regex`/`$options` pair against a resolved value, honoring
/// the array-maps-to-any-string-element rule. Non-string array elements are
/// skipped, never stringified.
pub fn eval_regex(actual: Option<&Value>, pattern: &str, options: &str) -> Result<bool> {
    match actual {
        None => Ok(false),
        Some(Value::String(s)) => regex_match_with_options(s, pattern, options),
        Some(Value::Array(arr)) => {
            for elem in arr {
                if let Value::String(s) = elem {
                    if regex_match_with_options(s, pattern, options)? {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        }
        Some(_) => Ok(false),
    }
}

/// Strict equality, used both by `$eq` and by implicit field equality.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

fn compare_with<F: Fn(std::cmp::Ordering) -> bool>(
    actual: Option<&Value>,
    expected: &Value,
    pred: F,
) -> bool {
    match actual {
        None => false,
        Some(Value::Array(arr)) => arr
            .iter()
            .any(|v| compare_values(v, expected).map(&pred).unwrap_or(false)),
        Some(v) => compare_values(v, expected).map(pred).unwrap_or(false),
    }
}

pub struct EqOperator;
impl OperatorMatcher for EqOperator {
    fn name(&self) -> &'static str {
        "$eq"
    }
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        Ok(match actual {
            None => false,
            Some(Value::Array(arr)) => {
                arr.iter().any(|v| values_equal(v, expected)) || values_equal(actual.unwrap(), expected)
            }
            Some(v) => values_equal(v, expected),
        })
    }
}

pub struct NeOperator;
impl OperatorMatcher for NeOperator {
    fn name(&self) -> &'static str {
        "$ne"
    }
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        Ok(match actual {
            None => true,
            Some(Value::Array(arr)) => !arr.iter().any(|v| values_equal(v, expected)),
            Some(v) => !values_equal(v, expected),
        })
    }
}

pub struct GtOperator;
impl OperatorMatcher for GtOperator {
    fn name(&self) -> &'static str {
        "$gt"
    }
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        Ok(compare_with(actual, expected, |o| o == std::cmp::Ordering::Greater))
    }
}

pub struct GteOperator;
impl OperatorMatcher for GteOperator {
    fn name(&self) -> &'static str {
        "$gte"
    }
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        Ok(compare_with(actual, expected, |o| o != std::cmp::Ordering::Less))
    }
}

pub struct LtOperator;
impl OperatorMatcher for LtOperator {
    fn name(&self) -> &'static str {
        "$lt"
    }
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        Ok(compare_with(actual, expected, |o| o == std::cmp::Ordering::Less))
    }
}

pub struct LteOperator;
impl OperatorMatcher for LteOperator {
    fn name(&self) -> &'static str {
        "$lte"
    }
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        Ok(compare_with(actual, expected, |o| o != std::cmp::Ordering::Greater))
    }
}

fn as_expected_list(expected: &Value) -> Result<&Vec<Value>> {
    expected
        .as_array()
        .ok_or_else(|| DocStoreError::ValidationError("$in/$nin require an array".to_string()))
}

pub struct InOperator;
impl OperatorMatcher for InOperator {
    fn name(&self) -> &'static str {
        "$in"
    }
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        let list = as_expected_list(expected)?;
        Ok(match actual {
            None => false,
            Some(Value::Array(arr)) => arr.iter().any(|v| list.iter().any(|e| values_equal(v, e))),
            Some(v) => list.iter().any(|e| values_equal(v, e)),
        })
    }
}

pub struct NinOperator;
impl OperatorMatcher for NinOperator {
    fn name(&self) -> &'static str {
        "$nin"
    }
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        let list = as_expected_list(expected)?;
        Ok(match actual {
            None => true,
            Some(Value::Array(arr)) => !arr.iter().any(|v| list.iter().any(|e| values_equal(v, e))),
            Some(v) => !list.iter().any(|e| values_equal(v, e)),
        })
    }
}

pub struct ExistsOperator;
impl OperatorMatcher for ExistsOperator {
    fn name(&self) -> &'static str {
        "$exists"
    }
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        let want = expected.as_bool().unwrap_or(true);
        Ok(actual.is_some() == want)
    }
}

pub struct ModOperator;
impl OperatorMatcher for ModOperator {
    fn name(&self) -> &'static str {
        "$mod"
    }
    fn matches(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        let pair = expected
            .as_array()
            .filter(|a| a.len() == 2)
            .ok_or_else(|| DocStoreError::ValidationError("$mod requires [divisor, remainder]".to_string()))?;
        let divisor = pair[0]
            .as_i64()
            .ok_or_else(|| DocStoreError::ValidationError("$mod divisor must be an integer".to_string()))?;
        let remainder = pair[1]
            .as_i64()
            .ok_or_else(|| DocStoreError::ValidationError("$mod remainder must be an integer".to_string()))?;
        if divisor == 0 {
            return Err(DocStoreError::ValidationError("$mod divisor must not be zero".to_string()));
        }
        let check = |n: i64| n % divisor == remainder;
        Ok(match actual {
            None => false,
            Some(Value::Array(arr)) => arr.iter().any(|v| v.as_i64().map(check).unwrap_or(false)),
            Some(v) => v.as_i64().map(check).unwrap_or(false),
        })
    }
}

lazy_static! {
    pub static ref OPERATOR_REGISTRY: HashMap<&'static str, Box<dyn OperatorMatcher>> = {
        let mut registry: HashMap<&'static str, Box<dyn OperatorMatcher>> = HashMap::new();
        registry.insert("$eq", Box::new(EqOperator));
        registry.insert("$ne", Box::new(NeOperator));
        registry.insert("$gt", Box::new(GtOperator));
        registry.insert("$gte", Box::new(GteOperator));
        registry.insert("$lt", Box::new(LtOperator));
        registry.insert("$lte", Box::new(LteOperator));
        registry.insert("$in", Box::new(InOperator));
        registry.insert("$nin", Box::new(NinOperator));
        registry.insert("$exists", Box::new(ExistsOperator));
        registry.insert("$mod", Box::new(ModOperator));
        registry
    };
}

/// Evaluate a field-level operator-expression object (e.g. `{$gt: 5}`)
/// against a resolved value. Handles `$regex`/`$options` pairing, `$not`
/// negation, and the "actual is undefined" special rules from the filter
/// matcher. Unknown operators are ignored with a logged warning.
pub fn eval_operator_expr(actual: Option<&Value>, cond: &serde_json::Map<String, Value>) -> Result<bool> {
    if let Some(pattern) = cond.get("$regex") {
        let pattern = pattern
            .as_str()
            .ok_or_else(|| DocStoreError::ValidationError("$regex requires a string pattern".to_string()))?;
        let options = cond.get("$options").and_then(|v| v.as_str()).unwrap_or("");
        if !eval_regex(actual, pattern, options)? {
            return Ok(false);
        }
    }

    for (op, expected) in cond {
        if op == "$regex" || op == "$options" {
            continue;
        }
        if !op.starts_with('$') {
            continue;
        }
        if op == "$not" {
            let inner = expected.as_object().ok_or_else(|| {
                DocStoreError::ValidationError("$not requires an operator expression".to_string())
            })?;
            if actual.is_none() {
                // Undefined actual fails every operator except $exists/$ne;
                // $not only flips that failure into success when every key
                // it wraps is one of those two exceptions.
                let trivially_true = inner.keys().all(|k| k == "$exists" || k == "$ne");
                if !trivially_true {
                    return Ok(false);
                }
            }
            if eval_operator_expr(actual, inner)? {
                return Ok(false);
            }
            continue;
        }
        if actual.is_none() && op != "$ne" {
            return Ok(false);
        }
        match OPERATOR_REGISTRY.get(op.as_str()) {
            Some(matcher) => {
                if !matcher.matches(actual, expected)? {
                    return Ok(false);
                }
            }
            None => {
                log_warn!("ignoring unknown query operator {op}");
            }
        }
    }
    Ok(true)
}
