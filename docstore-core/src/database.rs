// src/database.rs
//! The top-level handle: owns either a local collection cache or a remote
//! adapter, starts autosave and the shutdown poller for the local case, and
//! flushes on drop. This is what an embedding application constructs and
//! holds for the lifetime of the process.

use crate::adapter::{self, Verb};
use crate::cache::CollectionCache;
use crate::config::Options;
use crate::error::{DocStoreError, Result};
use crate::remote::RemoteAdapter;
use crate::shutdown::ShutdownCoordinator;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How often the shutdown-poll thread checks for a pending SIGTERM/SIGINT
/// between autosave ticks. Short enough that a signalled process exits
/// promptly without burning a whole core on a spin loop.
const SHUTDOWN_POLL_MS: u64 = 200;

enum Backend {
    Local(Arc<CollectionCache>),
    Remote(RemoteAdapter),
}

pub struct Database {
    backend: Backend,
    poll_stop: Arc<AtomicBool>,
    poll_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Database {
    /// Opens local storage, or — when `options.remote` is set — connects to
    /// a remote adapter instead and skips the local cache/autosave/shutdown
    /// machinery entirely (there is no local file to flush).
    pub fn open(options: Options) -> Result<Self> {
        if let Some(remote_options) = &options.remote {
            let remote = RemoteAdapter::new(remote_options)?;
            return Ok(Database {
                backend: Backend::Remote(remote),
                poll_stop: Arc::new(AtomicBool::new(false)),
                poll_handle: Mutex::new(None),
            });
        }

        std::fs::create_dir_all(&options.storage_path)?;
        let cache = CollectionCache::new(&options.storage_path);
        cache.start_autosave(options.auto_save_interval_ms);

        let coordinator = ShutdownCoordinator::register()?;
        let poll_stop = Arc::new(AtomicBool::new(false));
        let poll_cache = Arc::clone(&cache);
        let stop = Arc::clone(&poll_stop);
        let poll_handle = thread::spawn(move || loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            coordinator.poll(&poll_cache);
            thread::sleep(Duration::from_millis(SHUTDOWN_POLL_MS));
        });

        Ok(Database {
            backend: Backend::Local(cache),
            poll_stop,
            poll_handle: Mutex::new(Some(poll_handle)),
        })
    }

    /// Direct access to the cache, for callers that want to bypass the
    /// adapter's envelope (embedding code, tests). `None` in remote mode.
    pub fn cache(&self) -> Option<&Arc<CollectionCache>> {
        match &self.backend {
            Backend::Local(cache) => Some(cache),
            Backend::Remote(_) => None,
        }
    }

    /// Route a request through the local adapter or the remote adapter,
    /// always returning a `{data}`/`{error}` envelope either way.
    pub fn execute(&self, verb: Verb, endpoint: &str, payload: Value) -> Value {
        match &self.backend {
            Backend::Local(cache) => adapter::dispatch(cache, verb, endpoint, payload),
            Backend::Remote(remote) => match remote_route(remote, verb, endpoint, payload) {
                Ok(data) => adapter::ok_envelope(data),
                Err(e) => adapter::error_envelope(&e),
            },
        }
    }

    /// Flush every dirty collection immediately, outside the autosave tick.
    /// No-op in remote mode.
    pub fn flush(&self) {
        if let Backend::Local(cache) = &self.backend {
            cache.flush_all();
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.flush();
        self.poll_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.poll_handle.lock().unwrap().take() {
            // The poll thread wakes on its next tick at most
            // `SHUTDOWN_POLL_MS` later; we don't block drop waiting for it.
            drop(handle);
        }
    }
}

/// Maps a `(verb, endpoint, payload)` request onto `RemoteAdapter`'s typed
/// method set, the same routing table `adapter::route` uses locally.
fn remote_route(remote: &RemoteAdapter, verb: Verb, endpoint: &str, payload: Value) -> Result<Value> {
    let segments: Vec<&str> = endpoint.trim_matches('/').split('/').collect();
    let (collection, rest) = match segments.as_slice() {
        ["collections", name, tail @ ..] => (*name, tail),
        _ => {
            return Err(DocStoreError::ValidationError(format!(
                "unrecognized endpoint: {endpoint}"
            )))
        }
    };

    let obj = payload.as_object();
    let filter = obj.and_then(|o| o.get("filter")).cloned().unwrap_or_else(|| json!({}));
    let options = obj.and_then(|o| o.get("options")).cloned().unwrap_or_else(|| json!({}));
    let update = obj.and_then(|o| o.get("update")).cloned();

    match (verb, rest) {
        (Verb::Get, []) => remote.find(collection, filter, options),
        (Verb::Get, ["count"]) => remote.count(collection, filter),
        (Verb::Get, [id]) => remote.find_by_id(collection, id),
        (Verb::Post, []) => remote.insert(collection, payload),
        (Verb::Patch, []) => remote.update(collection, filter, update.unwrap_or(Value::Null)),
        (Verb::Patch, [id]) => remote.update_by_id(collection, id, update.unwrap_or(payload)),
        (Verb::Delete, ["drop"]) => remote.drop_collection(collection),
        (Verb::Delete, []) => remote.delete(collection, filter),
        (Verb::Delete, [id]) => remote.delete_by_id(collection, id),
        _ => Err(DocStoreError::ValidationError(format!(
            "unsupported route: {verb:?} {endpoint}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn open_creates_storage_dir_and_routes_requests() {
        let dir = tempfile::tempdir().unwrap();
        let storage_path = dir.path().join("nested").join("storage");
        let db = Database::open(Options {
            storage_path: storage_path.clone(),
            auto_save_interval_ms: 0,
            debug: false,
            remote: None,
        })
        .unwrap();
        assert!(storage_path.exists());

        let result = db.execute(Verb::Post, "/collections/widgets", json!({"n": 1}));
        assert!(result.get("data").is_some());

        db.flush();
        assert!(storage_path.join("widgets.json").exists());
    }
}
