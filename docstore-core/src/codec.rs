// src/codec.rs
//! The collection file wire format: `[\n` + one canonically-ordered,
//! single-line JSON document per entry, `,\n`-separated, `\n]`.

use crate::document::Document;
use crate::error::{DocStoreError, Result};
use serde_json::Value;

/// Encode a full collection as the literal wire layout.
pub fn encode_collection(documents: &[Document]) -> String {
    let mut out = String::from("[\n");
    for (i, doc) in documents.iter().enumerate() {
        let line = serde_json::to_string(&doc.to_canonical_value())
            .expect("canonical document value is always serializable");
        out.push_str(&line);
        if i + 1 < documents.len() {
            out.push(',');
        }
        out.push('\n');
    }
    out.push(']');
    out
}

/// Decode a collection file's contents. Any parse failure is reported as
/// `CorruptFile`; callers are expected to recover by starting empty.
pub fn decode_collection(contents: &str) -> Result<Vec<Document>> {
    let value: Value = serde_json::from_str(contents)
        .map_err(|e| DocStoreError::CorruptFile(e.to_string()))?;
    let arr = value
        .as_array()
        .ok_or_else(|| DocStoreError::CorruptFile("collection file is not a JSON array".to_string()))?;
    arr.iter().map(Document::from_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn round_trip() {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), json!("Alice"));
        let doc = Document::new("a".into(), fields);
        let encoded = encode_collection(&[doc.clone()]);
        let decoded = decode_collection(&encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, "a");
        assert_eq!(decoded[0].fields.get("name"), Some(&json!("Alice")));
    }

    #[test]
    fn empty_collection_is_valid_json_array() {
        let encoded = encode_collection(&[]);
        assert_eq!(encoded, "[\n]");
        let decoded = decode_collection(&encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn canonical_field_order_in_wire_form() {
        let mut fields = HashMap::new();
        fields.insert("zeta".to_string(), json!(1));
        fields.insert("alpha".to_string(), json!(2));
        let doc = Document::new("x".into(), fields);
        let encoded = encode_collection(&[doc]);
        let line = encoded.lines().nth(1).unwrap();
        let id_pos = line.find("\"id\"").unwrap();
        let alpha_pos = line.find("\"alpha\"").unwrap();
        let zeta_pos = line.find("\"zeta\"").unwrap();
        let created_pos = line.find("\"createdAt\"").unwrap();
        let updated_pos = line.find("\"updatedAt\"").unwrap();
        assert!(id_pos < alpha_pos);
        assert!(alpha_pos < zeta_pos);
        assert!(zeta_pos < created_pos);
        assert!(created_pos < updated_pos);
    }

    #[test]
    fn corrupt_file_reports_corrupt_error() {
        let err = decode_collection("not json").unwrap_err();
        assert!(matches!(err, DocStoreError::CorruptFile(_)));
    }
}
