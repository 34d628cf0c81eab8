// src/adapter.rs
//! The local adapter: the single place that turns a (verb, endpoint,
//! payload) request into a collection-cache operation and a response
//! envelope. A remote adapter (`crate::remote`) speaks the identical
//! operation set over HTTP to a process running this same routing table.

use crate::cache::CollectionCache;
use crate::document::Document;
use crate::error::{DocStoreError, Result};
use crate::find_options::{
    apply_limit_skip, apply_projection, apply_projection_all, apply_sort, Projection, Sort,
};
use crate::query::matches_filter;
use crate::update::{apply_update, normalize_update};
use crate::validate;
use serde_json::{json, Value};
use std::sync::Arc;

/// Verbs the adapter understands, mirroring HTTP methods without depending
/// on an HTTP crate at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Patch,
    Delete,
}

/// A successful response is always `{data: ...}`; callers that need the
/// error envelope use `DocStoreError::code()` directly (see `adapter::envelope`).
pub fn ok_envelope(data: Value) -> Value {
    json!({ "data": data })
}

pub fn error_envelope(err: &DocStoreError) -> Value {
    json!({ "error": { "message": err.to_string(), "code": err.code() } })
}

/// Entry point: routes a single request to the matching operation and
/// always returns a `{data}`/`{error}` envelope, never a bare `Err`.
pub fn dispatch(cache: &Arc<CollectionCache>, verb: Verb, endpoint: &str, payload: Value) -> Value {
    match route(cache, verb, endpoint, payload) {
        Ok(data) => ok_envelope(data),
        Err(e) => error_envelope(&e),
    }
}

fn route(cache: &Arc<CollectionCache>, verb: Verb, endpoint: &str, payload: Value) -> Result<Value> {
    let segments: Vec<&str> = endpoint.trim_matches('/').split('/').collect();
    let (collection, rest) = match segments.as_slice() {
        ["collections", name, tail @ ..] => (*name, tail),
        _ => {
            return Err(DocStoreError::ValidationError(format!(
                "unrecognized endpoint: {endpoint}"
            )))
        }
    };
    validate::validate_collection_name(collection)?;

    match (verb, rest) {
        (Verb::Get, []) => find(cache, collection, &payload),
        (Verb::Get, ["count"]) => count(cache, collection, &payload),
        (Verb::Get, [id]) => find_by_id(cache, collection, id),
        (Verb::Post, []) => insert(cache, collection, payload),
        (Verb::Patch, []) => update_many(cache, collection, &payload),
        (Verb::Patch, [id]) => update_by_id(cache, collection, id, payload),
        (Verb::Delete, ["drop"]) => drop_collection(cache, collection),
        (Verb::Delete, []) => delete_many(cache, collection, &payload),
        (Verb::Delete, [id]) => delete_by_id(cache, collection, id),
        _ => Err(DocStoreError::ValidationError(format!(
            "unsupported route: {verb:?} {endpoint}"
        ))),
    }
}

fn filter_and_options(payload: &Value) -> Result<(Value, Value)> {
    let obj = payload.as_object();
    let filter = obj
        .and_then(|o| o.get("filter"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    let options = obj
        .and_then(|o| o.get("options"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    validate::validate_filter(&filter)?;
    validate::validate_options(&options)?;
    Ok((filter, options))
}

fn parse_sort(options: &Value) -> Sort {
    let mut sort = Sort::new();
    if let Some(obj) = options.get("sort").and_then(|v| v.as_object()) {
        for (field, dir) in obj {
            let direction = match dir {
                Value::Bool(true) => 1,
                Value::Bool(false) => -1,
                other => other.as_i64().unwrap_or(1) as i32,
            };
            sort.push((field.clone(), direction));
        }
    }
    sort
}

fn parse_projection(options: &Value) -> Projection {
    let mut projection = Projection::new();
    if let Some(obj) = options.get("fields").and_then(|v| v.as_object()) {
        for (field, v) in obj {
            let include = match v {
                Value::Bool(b) => *b,
                other => other.as_i64().map(|n| n == 1).unwrap_or(true),
            };
            projection.insert(field.clone(), include);
        }
    }
    projection
}

/// `limit`/`skip` if given directly; otherwise `page`/`limit` combine into
/// `skip = (page - 1) * limit`. `page` without `limit` is meaningless and
/// ignored.
fn effective_limit_skip(options: &Value) -> (Option<usize>, Option<usize>) {
    let obj = match options.as_object() {
        Some(o) => o,
        None => return (None, None),
    };
    let limit = obj.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize);
    let skip = if let Some(skip) = obj.get("skip").and_then(|v| v.as_u64()) {
        Some(skip as usize)
    } else if let (Some(page), Some(limit)) = (obj.get("page").and_then(|v| v.as_u64()), limit) {
        Some((page.saturating_sub(1) as usize) * limit)
    } else {
        None
    };
    (limit, skip)
}

fn page_envelope(matched_total: usize, limit: Option<usize>, skip: usize, returned: usize) -> Value {
    let limit_val = limit.unwrap_or(matched_total.max(1));
    let page = if limit_val == 0 { 1 } else { skip / limit_val + 1 };
    let total_pages = if limit_val == 0 {
        1
    } else {
        (matched_total + limit_val - 1) / limit_val.max(1)
    }
    .max(1);
    let start_index = if returned == 0 { 0 } else { skip + 1 };
    let end_index = skip + returned;
    json!({
        "page": page,
        "limit": limit,
        "skip": skip,
        "totalDocuments": matched_total,
        "totalPages": total_pages,
        "hasNext": page < total_pages,
        "hasPrev": page > 1,
        "nextPage": if page < total_pages { Some(page + 1) } else { None },
        "prevPage": if page > 1 { Some(page - 1) } else { None },
        "startIndex": start_index,
        "endIndex": end_index,
    })
}

fn matching_snapshot(cache: &Arc<CollectionCache>, collection: &str, filter: &Value) -> Result<Vec<Document>> {
    let docs = cache.snapshot(collection)?;
    let mut matched = Vec::new();
    for doc in docs {
        if matches_filter(&doc, filter)? {
            matched.push(doc);
        }
    }
    Ok(matched)
}

/// `returnType` is an update/find-options-adjacent vocabulary but only
/// applies to the operations that document-carrying callers actually
/// branch on in the spec: find itself only ever returns `{documents,
/// pagination?}`, with the pagination block present only when `limit` was
/// set.
fn find(cache: &Arc<CollectionCache>, collection: &str, payload: &Value) -> Result<Value> {
    let (filter, options) = filter_and_options(payload)?;
    let matched = matching_snapshot(cache, collection, &filter)?;
    let total = matched.len();

    let mut values: Vec<Value> = matched.iter().map(Document::to_canonical_value).collect();
    apply_sort(&mut values, &parse_sort(&options));

    let (limit, skip) = effective_limit_skip(&options);
    let sliced = apply_limit_skip(values, limit, skip);
    let projected = apply_projection_all(&sliced, &parse_projection(&options));

    if limit.is_some() {
        Ok(json!({
            "documents": projected,
            "pagination": page_envelope(total, limit, skip.unwrap_or(0), projected.len()),
        }))
    } else {
        Ok(json!({ "documents": projected }))
    }
}

fn count(cache: &Arc<CollectionCache>, collection: &str, payload: &Value) -> Result<Value> {
    let (filter, _options) = filter_and_options(payload)?;
    let matched = matching_snapshot(cache, collection, &filter)?;
    Ok(json!(matched.len()))
}

fn find_by_id(cache: &Arc<CollectionCache>, collection: &str, id: &str) -> Result<Value> {
    let docs = cache.snapshot(collection)?;
    docs.iter()
        .find(|d| d.id == id)
        .map(Document::to_canonical_value)
        .ok_or_else(|| DocStoreError::NotFound(id.to_string()))
}

/// Bulk insert (≥2 documents) mints sequential ids as
/// `<base36-epoch-millis>_<1-based-index>` for every document missing one;
/// a single-document insert without an id gets one random 16-hex-character
/// id instead. An explicit id that collides with an existing document
/// upserts: a shallow merge of the new fields over the old, preserving
/// `createdAt` and refreshing `updatedAt`. The envelope reports
/// `insertedCount`/`updatedCount`/`totalDocuments`, plus `insertedIds` (up
/// to 20 entries) or a `firstId`/`lastId` pair when more were inserted.
fn insert(cache: &Arc<CollectionCache>, collection: &str, payload: Value) -> Result<Value> {
    let items: Vec<Value> = match payload {
        Value::Array(arr) => arr,
        other => vec![other],
    };
    if items.is_empty() {
        return Err(DocStoreError::ValidationError("insert requires at least one document".to_string()));
    }

    let base = crate::document::now_millis_monotonic();
    let bulk = items.len() > 1;
    let mut inserted_ids: Vec<String> = Vec::new();
    let mut inserted_count = 0usize;
    let mut updated_count = 0usize;
    let mut total_documents = 0usize;

    cache.update(collection, |state| {
        for (i, item) in items.into_iter().enumerate() {
            let mut obj = item
                .as_object()
                .cloned()
                .ok_or_else(|| DocStoreError::ValidationError("document must be an object".to_string()))?;

            if !obj.contains_key("id") {
                let id = if bulk {
                    format!("{}_{}", to_base36(base), i + 1)
                } else {
                    crate::document::random_id()
                };
                obj.insert("id".to_string(), Value::String(id));
            }

            let doc = Document::from_value(&Value::Object(obj))?;
            if let Some(&idx) = state.id_index.get(&doc.id) {
                let existing = &mut state.documents[idx];
                for (k, v) in doc.fields {
                    existing.fields.insert(k, v);
                }
                existing.touch();
                updated_count += 1;
            } else {
                inserted_ids.push(doc.id.clone());
                state.id_index.insert(doc.id.clone(), state.documents.len());
                state.documents.push(doc);
                inserted_count += 1;
            }
        }
        total_documents = state.documents.len();
        Ok(((), true))
    })?;

    let mut envelope = serde_json::Map::new();
    envelope.insert("insertedCount".to_string(), json!(inserted_count));
    envelope.insert("updatedCount".to_string(), json!(updated_count));
    envelope.insert("totalDocuments".to_string(), json!(total_documents));
    if !inserted_ids.is_empty() {
        if inserted_ids.len() <= 20 {
            envelope.insert("insertedIds".to_string(), json!(inserted_ids));
        } else {
            envelope.insert("firstId".to_string(), json!(inserted_ids.first()));
            envelope.insert("lastId".to_string(), json!(inserted_ids.last()));
        }
    }
    Ok(Value::Object(envelope))
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap()
}

/// Options: `returnType` (default `count`), `maxReturn` (default 50),
/// `fields`. Envelope is always `{updatedCount, totalDocuments}` plus,
/// depending on `returnType`, `updatedIds` or `updatedDocuments` truncated
/// to `maxReturn` with a `truncated`/`maxReturn` marker when exceeded.
fn update_many(cache: &Arc<CollectionCache>, collection: &str, payload: &Value) -> Result<Value> {
    let obj = payload.as_object();
    let filter = obj.and_then(|o| o.get("filter")).cloned().unwrap_or_else(|| json!({}));
    let update = obj
        .and_then(|o| o.get("update"))
        .cloned()
        .ok_or_else(|| DocStoreError::ValidationError("update requires an 'update' field".to_string()))?;
    let options = obj.and_then(|o| o.get("options")).cloned().unwrap_or_else(|| json!({}));
    validate::validate_filter(&filter)?;
    validate::validate_options(&options)?;
    let normalized = normalize_update(&update)?;

    let matched_ids: Vec<String> = matching_snapshot(cache, collection, &filter)?
        .into_iter()
        .map(|d| d.id)
        .collect();

    let mut updated_ids: Vec<String> = Vec::new();
    for id in &matched_ids {
        let changed = cache.update_document(collection, id, |doc| apply_update(doc, &normalized))?;
        if changed {
            updated_ids.push(id.clone());
        }
    }

    let total_documents = cache.snapshot(collection)?.len();
    let return_type = options.get("returnType").and_then(|v| v.as_str()).unwrap_or("count");
    let max_return = options.get("maxReturn").and_then(|v| v.as_u64()).unwrap_or(50) as usize;

    let mut envelope = serde_json::Map::new();
    envelope.insert("updatedCount".to_string(), json!(updated_ids.len()));
    envelope.insert("totalDocuments".to_string(), json!(total_documents));

    match return_type {
        "ids" => {
            let truncated = updated_ids.len() > max_return;
            updated_ids.truncate(max_return);
            envelope.insert("updatedIds".to_string(), json!(updated_ids));
            if truncated {
                envelope.insert("truncated".to_string(), json!(true));
                envelope.insert("maxReturn".to_string(), json!(max_return));
            }
        }
        "documents" => {
            let snapshot = cache.snapshot(collection)?;
            let projection = parse_projection(&options);
            let truncated = updated_ids.len() > max_return;
            let docs: Vec<Value> = updated_ids
                .into_iter()
                .take(max_return)
                .filter_map(|id| snapshot.iter().find(|d| d.id == id))
                .map(Document::to_canonical_value)
                .collect();
            let projected = apply_projection_all(&docs, &projection);
            envelope.insert("updatedDocuments".to_string(), json!(projected));
            if truncated {
                envelope.insert("truncated".to_string(), json!(true));
                envelope.insert("maxReturn".to_string(), json!(max_return));
            }
        }
        _ => {}
    }

    Ok(Value::Object(envelope))
}

/// Applies the normalized update to a single document by id, then returns
/// the shape named by `options.returnType` (default `document`): the
/// (optionally projected) post-image, the bare id, or `1` for `count`.
fn update_by_id(cache: &Arc<CollectionCache>, collection: &str, id: &str, payload: Value) -> Result<Value> {
    let obj = payload.as_object();
    let update = obj
        .and_then(|o| o.get("update"))
        .cloned()
        .unwrap_or_else(|| payload.clone());
    let options = obj.and_then(|o| o.get("options")).cloned().unwrap_or_else(|| json!({}));
    validate::validate_options(&options)?;
    let normalized = normalize_update(&update)?;
    cache.update_document(collection, id, |doc| apply_update(doc, &normalized))?;

    let docs = cache.snapshot(collection)?;
    let doc = docs
        .iter()
        .find(|d| d.id == id)
        .ok_or_else(|| DocStoreError::NotFound(id.to_string()))?;

    let return_type = options.get("returnType").and_then(|v| v.as_str()).unwrap_or("document");
    let data = match return_type {
        "count" => json!(1),
        "id" => json!(doc.id),
        _ => apply_projection(&doc.to_canonical_value(), &parse_projection(&options)),
    };
    Ok(data)
}

fn delete_many(cache: &Arc<CollectionCache>, collection: &str, payload: &Value) -> Result<Value> {
    let (filter, _options) = filter_and_options(payload)?;
    if filter.as_object().map(|o| o.is_empty()).unwrap_or(true) {
        return Err(DocStoreError::EmptyDeleteFilter);
    }
    let matched_ids: Vec<String> = matching_snapshot(cache, collection, &filter)?
        .into_iter()
        .map(|d| d.id)
        .collect();
    for id in &matched_ids {
        cache.remove_document(collection, id)?;
    }
    Ok(json!({ "collectionName": collection, "deletedCount": matched_ids.len() }))
}

fn delete_by_id(cache: &Arc<CollectionCache>, collection: &str, id: &str) -> Result<Value> {
    let removed = cache.remove_document(collection, id)?;
    Ok(removed.to_canonical_value())
}

fn drop_collection(cache: &Arc<CollectionCache>, collection: &str) -> Result<Value> {
    cache.drop_collection(collection)?;
    Ok(json!({ "dropped": collection }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cache() -> Arc<CollectionCache> {
        let dir = tempfile::tempdir().unwrap();
        let cache = CollectionCache::new(dir.path());
        std::mem::forget(dir);
        cache
    }

    #[test]
    fn insert_single_assigns_random_id() {
        let cache = cache();
        let result = dispatch(&cache, Verb::Post, "/collections/widgets", json!({"n": 1}));
        assert_eq!(result["data"]["insertedCount"], 1);
        assert_eq!(result["data"]["updatedCount"], 0);
        assert_eq!(result["data"]["totalDocuments"], 1);
        let ids = result["data"]["insertedIds"].as_array().unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].as_str().unwrap().len(), 16);
    }

    #[test]
    fn insert_bulk_assigns_sequential_ids() {
        let cache = cache();
        let result = dispatch(
            &cache,
            Verb::Post,
            "/collections/widgets",
            json!([{"n": 1}, {"n": 2}, {"n": 3}]),
        );
        assert_eq!(result["data"]["insertedCount"], 3);
        assert_eq!(result["data"]["totalDocuments"], 3);
        let ids: Vec<&str> = result["data"]["insertedIds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids[0].ends_with("_1"));
        assert!(ids[1].ends_with("_2"));
        assert!(ids[2].ends_with("_3"));
    }

    #[test]
    fn insert_with_colliding_id_upserts() {
        let cache = cache();
        dispatch(&cache, Verb::Post, "/collections/widgets", json!({"id": "a", "n": 1}));
        let result = dispatch(&cache, Verb::Post, "/collections/widgets", json!({"id": "a", "n": 2}));
        assert_eq!(result["data"]["insertedCount"], 0);
        assert_eq!(result["data"]["updatedCount"], 1);
        assert_eq!(result["data"]["totalDocuments"], 1);
        let found = dispatch(&cache, Verb::Get, "/collections/widgets/a", json!(null));
        assert_eq!(found["data"]["n"], 2);
    }

    #[test]
    fn find_with_filter_sort_limit() {
        let cache = cache();
        dispatch(&cache, Verb::Post, "/collections/widgets", json!([{"n": 3}, {"n": 1}, {"n": 2}]));
        let result = dispatch(
            &cache,
            Verb::Get,
            "/collections/widgets",
            json!({"filter": {}, "options": {"sort": {"n": 1}, "limit": 2}}),
        );
        let docs = result["data"]["documents"].as_array().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["n"], 1);
        assert_eq!(docs[1]["n"], 2);
        assert_eq!(result["data"]["pagination"]["totalDocuments"], 3);
    }

    #[test]
    fn find_without_limit_omits_pagination() {
        let cache = cache();
        dispatch(&cache, Verb::Post, "/collections/widgets", json!({"n": 1}));
        let result = dispatch(&cache, Verb::Get, "/collections/widgets", json!({}));
        assert!(result["data"].get("pagination").is_none());
        assert_eq!(result["data"]["documents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn update_many_reports_updated_count_and_ids() {
        let cache = cache();
        dispatch(&cache, Verb::Post, "/collections/widgets", json!([{"n": 1}, {"n": 2}]));
        let result = dispatch(
            &cache,
            Verb::Patch,
            "/collections/widgets",
            json!({"filter": {}, "update": {"$set": {"hit": true}}, "options": {"returnType": "ids"}}),
        );
        assert_eq!(result["data"]["updatedCount"], 2);
        assert_eq!(result["data"]["totalDocuments"], 2);
        assert_eq!(result["data"]["updatedIds"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn delete_rejects_empty_filter() {
        let cache = cache();
        let result = dispatch(&cache, Verb::Delete, "/collections/widgets", json!({}));
        assert!(result.get("error").is_some());
    }

    #[test]
    fn delete_many_returns_collection_name_and_count() {
        let cache = cache();
        dispatch(&cache, Verb::Post, "/collections/widgets", json!({"status": "x"}));
        let result = dispatch(
            &cache,
            Verb::Delete,
            "/collections/widgets",
            json!({"filter": {"status": "x"}}),
        );
        assert_eq!(result["data"]["collectionName"], "widgets");
        assert_eq!(result["data"]["deletedCount"], 1);
    }

    #[test]
    fn delete_by_id_removes_document() {
        let cache = cache();
        let inserted = dispatch(&cache, Verb::Post, "/collections/widgets", json!({"n": 1}));
        let id = inserted["data"]["insertedIds"][0].as_str().unwrap().to_string();
        let result = dispatch(&cache, Verb::Delete, &format!("/collections/widgets/{id}"), json!(null));
        assert_eq!(result["data"]["id"], id);
        let missing = dispatch(&cache, Verb::Get, &format!("/collections/widgets/{id}"), json!(null));
        assert!(missing.get("error").is_some());
    }

    #[test]
    fn update_by_id_applies_set() {
        let cache = cache();
        let inserted = dispatch(&cache, Verb::Post, "/collections/widgets", json!({"n": 1}));
        let id = inserted["data"]["insertedIds"][0].as_str().unwrap().to_string();
        let result = dispatch(
            &cache,
            Verb::Patch,
            &format!("/collections/widgets/{id}"),
            json!({"update": {"$set": {"n": 99}}}),
        );
        assert_eq!(result["data"]["n"], 99);
    }

    #[test]
    fn update_by_id_honors_return_type_id() {
        let cache = cache();
        let inserted = dispatch(&cache, Verb::Post, "/collections/widgets", json!({"n": 1}));
        let id = inserted["data"]["insertedIds"][0].as_str().unwrap().to_string();
        let result = dispatch(
            &cache,
            Verb::Patch,
            &format!("/collections/widgets/{id}"),
            json!({"update": {"$set": {"n": 2}}, "options": {"returnType": "id"}}),
        );
        assert_eq!(result["data"], id);
    }

    #[test]
    fn drop_collection_removes_everything() {
        let cache = cache();
        dispatch(&cache, Verb::Post, "/collections/widgets", json!({"n": 1}));
        let result = dispatch(&cache, Verb::Delete, "/collections/widgets/drop", json!(null));
        assert_eq!(result["data"]["dropped"], "widgets");
        let find_result = dispatch(&cache, Verb::Get, "/collections/widgets", json!({}));
        assert_eq!(find_result["data"]["documents"].as_array().unwrap().len(), 0);
    }
}
