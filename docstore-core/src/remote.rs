// src/remote.rs
//! The remote adapter: same operation set as `crate::adapter`, carried over
//! HTTP to a server exposing this crate's routing table. Used when
//! `Options::remote` is set instead of a local storage path.

use crate::config::RemoteOptions;
use crate::error::{DocStoreError, Result};
use reqwest::blocking::{Client, Response};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

pub struct RemoteAdapter {
    client: Client,
    base_url: String,
    token: Option<String>,
    max_retries: u32,
}

impl RemoteAdapter {
    pub fn new(opts: &RemoteOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(opts.timeout_ms))
            .pool_max_idle_per_host(opts.pool_size)
            .build()
            .map_err(|e| DocStoreError::StorageError(e.to_string()))?;
        Ok(RemoteAdapter {
            client,
            base_url: opts.database_url.trim_end_matches('/').to_string(),
            token: opts.token.clone(),
            max_retries: opts.max_retries,
        })
    }

    pub fn find(&self, collection: &str, filter: Value, options: Value) -> Result<Value> {
        self.call(
            Method::GET,
            &format!("/collections/{collection}"),
            serde_json::json!({ "filter": filter, "options": options }),
        )
    }

    pub fn find_by_id(&self, collection: &str, id: &str) -> Result<Value> {
        self.call(Method::GET, &format!("/collections/{collection}/{id}"), Value::Null)
    }

    pub fn count(&self, collection: &str, filter: Value) -> Result<Value> {
        self.call(
            Method::GET,
            &format!("/collections/{collection}/count"),
            serde_json::json!({ "filter": filter }),
        )
    }

    pub fn insert(&self, collection: &str, documents: Value) -> Result<Value> {
        self.call(Method::POST, &format!("/collections/{collection}"), documents)
    }

    pub fn update(&self, collection: &str, filter: Value, update: Value) -> Result<Value> {
        self.call(
            Method::PATCH,
            &format!("/collections/{collection}"),
            serde_json::json!({ "filter": filter, "update": update }),
        )
    }

    pub fn update_by_id(&self, collection: &str, id: &str, update: Value) -> Result<Value> {
        self.call(
            Method::PATCH,
            &format!("/collections/{collection}/{id}"),
            serde_json::json!({ "update": update }),
        )
    }

    pub fn delete(&self, collection: &str, filter: Value) -> Result<Value> {
        self.call(
            Method::DELETE,
            &format!("/collections/{collection}"),
            serde_json::json!({ "filter": filter }),
        )
    }

    pub fn delete_by_id(&self, collection: &str, id: &str) -> Result<Value> {
        self.call(Method::DELETE, &format!("/collections/{collection}/{id}"), Value::Null)
    }

    pub fn drop_collection(&self, collection: &str) -> Result<Value> {
        self.call(Method::DELETE, &format!("/collections/{collection}/drop"), Value::Null)
    }

    fn call(&self, method: Method, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;
        loop {
            let mut req = self.client.request(method.clone(), &url);
            if let Some(token) = &self.token {
                req = req.bearer_auth(token);
            }
            if !body.is_null() {
                req = req.json(&body);
            }
            match req.send() {
                Ok(response) => return parse_envelope(response),
                Err(e) if attempt < self.max_retries => {
                    crate::log_warn!("remote call to {url} failed (attempt {attempt}): {e}, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(DocStoreError::StorageError(e.to_string())),
            }
        }
    }
}

fn parse_envelope(response: Response) -> Result<Value> {
    let body: Value = response
        .json()
        .map_err(|e| DocStoreError::StorageError(e.to_string()))?;
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("remote error")
            .to_string();
        return Err(DocStoreError::StorageError(message));
    }
    Ok(body.get("data").cloned().unwrap_or(Value::Null))
}
