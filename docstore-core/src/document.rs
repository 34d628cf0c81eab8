// src/document.rs
//! The document type: a reserved `id`/`createdAt`/`updatedAt` triple plus an
//! open bag of JSON-compatible fields.

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";

/// A single document. `id` is immutable once set; `createdAt` is stamped on
/// insert and never mutated again; `updatedAt` is refreshed on every update
/// path that actually changes the document.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub fields: HashMap<String, Value>,
}

/// Current UTC time formatted the way every timestamp in this crate is
/// formatted: RFC3339 with a `Z` suffix.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// A random 16-hex-character id, used for single-document inserts that
/// don't supply their own id.
pub fn random_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw[..16].to_string()
}

/// Milliseconds since the Unix epoch, used to name atomic-save temp files
/// and to mint sequential bulk-insert ids. Not a monotonic clock guarantee
/// beyond what the system clock itself provides.
pub fn now_millis_monotonic() -> u128 {
    Utc::now().timestamp_millis() as u128
}

impl Document {
    pub fn new(id: String, fields: HashMap<String, Value>) -> Self {
        let ts = now_iso8601();
        Document {
            id,
            created_at: ts.clone(),
            updated_at: ts,
            fields,
        }
    }

    /// Build a document from a freeform JSON object, pulling the reserved
    /// triple out of the map if present and defaulting otherwise.
    pub fn from_value(value: &Value) -> crate::error::Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            crate::error::DocStoreError::ValidationError("document must be an object".into())
        })?;
        let id = match obj.get(FIELD_ID) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(crate::error::DocStoreError::ValidationError(format!(
                    "document id must be a string, got {other}"
                )))
            }
            None => random_id(),
        };
        let now = now_iso8601();
        let created_at = obj
            .get(FIELD_CREATED_AT)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| now.clone());
        let updated_at = obj
            .get(FIELD_UPDATED_AT)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or(now);
        let mut fields = HashMap::new();
        for (k, v) in obj {
            if k != FIELD_ID && k != FIELD_CREATED_AT && k != FIELD_UPDATED_AT {
                fields.insert(k.clone(), v.clone());
            }
        }
        Ok(Document {
            id,
            created_at,
            updated_at,
            fields,
        })
    }

    /// Render the document, including the reserved triple, as a single JSON
    /// object in canonical field order: `id`, sorted other fields,
    /// `createdAt`, `updatedAt`.
    pub fn to_canonical_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(FIELD_ID.to_string(), Value::String(self.id.clone()));
        let mut keys: Vec<&String> = self.fields.keys().collect();
        keys.sort();
        for k in keys {
            map.insert(k.clone(), self.fields[k].clone());
        }
        map.insert(
            FIELD_CREATED_AT.to_string(),
            Value::String(self.created_at.clone()),
        );
        map.insert(
            FIELD_UPDATED_AT.to_string(),
            Value::String(self.updated_at.clone()),
        );
        Value::Object(map)
    }

    /// Get a field (including the reserved triple) by dotted path, applying
    /// array-mapping semantics when a path segment crosses a list without an
    /// integer index. See `crate::path::resolve`.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        if path == FIELD_ID {
            return Some(Value::String(self.id.clone()));
        }
        if path == FIELD_CREATED_AT {
            return Some(Value::String(self.created_at.clone()));
        }
        if path == FIELD_UPDATED_AT {
            return Some(Value::String(self.updated_at.clone()));
        }
        let mut parts = path.splitn(2, '.');
        let head = parts.next()?;
        let value = self.fields.get(head)?;
        match parts.next() {
            Some(rest) => crate::path::resolve(value, rest),
            None => Some(value.clone()),
        }
    }

    /// `$set` at a dotted path. The reserved triple cannot be targeted here;
    /// callers must reject id mutation before calling this.
    pub fn set_path(&mut self, path: &str, value: Value) {
        if path == FIELD_CREATED_AT || path == FIELD_UPDATED_AT || path == FIELD_ID {
            return;
        }
        if !path.contains('.') {
            self.fields.insert(path.to_string(), value);
            return;
        }
        let mut parts = path.splitn(2, '.');
        let head = parts.next().unwrap();
        let rest = parts.next().unwrap();
        let entry = self
            .fields
            .entry(head.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        crate::path::set_at(entry, rest, value);
    }

    /// `$unset` at a dotted path. No-op if the path doesn't resolve.
    pub fn remove_path(&mut self, path: &str) {
        if path == FIELD_CREATED_AT || path == FIELD_UPDATED_AT || path == FIELD_ID {
            return;
        }
        if !path.contains('.') {
            self.fields.remove(path);
            return;
        }
        let mut parts = path.splitn(2, '.');
        let head = parts.next().unwrap();
        let rest = parts.next().unwrap();
        if let Some(entry) = self.fields.get_mut(head) {
            crate::path::remove_at(entry, rest);
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_iso8601();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_generates_id_when_missing() {
        let doc = Document::from_value(&json!({"n": 1})).unwrap();
        assert_eq!(doc.id.len(), 16);
        assert_eq!(doc.created_at, doc.updated_at);
    }

    #[test]
    fn from_value_keeps_supplied_id() {
        let doc = Document::from_value(&json!({"id": "abc", "n": 1})).unwrap();
        assert_eq!(doc.id, "abc");
    }

    #[test]
    fn canonical_value_orders_fields() {
        let mut fields = HashMap::new();
        fields.insert("zeta".to_string(), json!(1));
        fields.insert("alpha".to_string(), json!(2));
        let doc = Document::new("x".into(), fields);
        let v = doc.to_canonical_value();
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["id", "alpha", "zeta", "createdAt", "updatedAt"]);
    }

    #[test]
    fn get_path_nested() {
        let mut fields = HashMap::new();
        fields.insert("address".to_string(), json!({"city": "Budapest"}));
        let doc = Document::new("x".into(), fields);
        assert_eq!(doc.get_path("address.city"), Some(json!("Budapest")));
        assert_eq!(doc.get_path("address.zip"), None);
    }

    #[test]
    fn set_path_creates_intermediate_maps() {
        let mut doc = Document::new("x".into(), HashMap::new());
        doc.set_path("address.city", json!("Szeged"));
        assert_eq!(doc.get_path("address.city"), Some(json!("Szeged")));
    }

    #[test]
    fn id_cannot_be_targeted_by_set_or_remove() {
        let mut doc = Document::new("x".into(), HashMap::new());
        doc.set_path("id", json!("y"));
        assert_eq!(doc.id, "x");
        doc.remove_path("id");
        assert_eq!(doc.id, "x");
    }
}
