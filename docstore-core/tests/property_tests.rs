// Property tests over the codec and query engine, per the testable
// properties that don't reduce to a single example-based assertion.

use docstore_core::document::Document;
use docstore_core::{codec, matches_filter};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;

fn arb_scalar() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i32>().prop_map(serde_json::Value::from),
        "[a-z]{1,8}".prop_map(serde_json::Value::from),
    ]
}

fn arb_document() -> impl Strategy<Value = Document> {
    (
        "[a-z0-9]{6,12}",
        prop::collection::hash_map("[a-z]{1,6}", arb_scalar(), 0..5),
    )
        .prop_map(|(id, fields)| {
            let fields: HashMap<String, serde_json::Value> = fields.into_iter().collect();
            Document::new(id, fields)
        })
}

proptest! {
    #[test]
    fn codec_round_trips_any_document_set(docs in prop::collection::vec(arb_document(), 0..10)) {
        let encoded = codec::encode_collection(&docs);
        let decoded = codec::decode_collection(&encoded).unwrap();
        prop_assert_eq!(decoded.len(), docs.len());
        for (original, round_tripped) in docs.iter().zip(decoded.iter()) {
            prop_assert_eq!(&original.id, &round_tripped.id);
            prop_assert_eq!(&original.created_at, &round_tripped.created_at);
            prop_assert_eq!(&original.fields, &round_tripped.fields);
        }
    }

    #[test]
    fn empty_filter_always_matches(doc in arb_document()) {
        prop_assert!(matches_filter(&doc, &json!({})).unwrap());
    }

    #[test]
    fn equality_filter_on_id_matches_only_that_document(a in arb_document(), b in arb_document()) {
        let filter = json!({ "id": a.id.clone() });
        prop_assert!(matches_filter(&a, &filter).unwrap());
        if a.id != b.id {
            prop_assert!(!matches_filter(&b, &filter).unwrap());
        }
    }

    #[test]
    fn not_is_the_exact_negation_of_its_inner_filter(doc in arb_document(), n in any::<i32>()) {
        let inner = json!({ "n": n });
        let negated = json!({ "$not": inner.clone() });
        let direct = matches_filter(&doc, &inner).unwrap();
        let via_not = matches_filter(&doc, &negated).unwrap();
        prop_assert_eq!(direct, !via_not);
    }
}
