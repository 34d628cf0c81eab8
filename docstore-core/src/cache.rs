// src/cache.rs
//! Per-collection in-memory cache plus the durability machinery around it:
//! lazy load, index-coherent mutation, atomic save, background autosave,
//! and drop. The process-wide registry below is the one shared piece of
//! mutable state in the crate; everything inside a single collection is
//! serialized behind its own lane.

use crate::codec;
use crate::document::Document;
use crate::error::{DocStoreError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A collection's live state: the ordered document list, its id index, and
/// a dirty flag set by every mutation and cleared by a successful save.
pub struct CollectionState {
    pub documents: Vec<Document>,
    pub id_index: HashMap<String, usize, RandomState>,
    pub dirty: bool,
}

impl CollectionState {
    fn from_documents(documents: Vec<Document>) -> Self {
        let mut id_index = HashMap::with_hasher(RandomState::new());
        for (i, doc) in documents.iter().enumerate() {
            id_index.insert(doc.id.clone(), i);
        }
        CollectionState {
            documents,
            id_index,
            dirty: false,
        }
    }

    fn reindex(&mut self) {
        self.id_index.clear();
        for (i, doc) in self.documents.iter().enumerate() {
            self.id_index.insert(doc.id.clone(), i);
        }
    }
}

/// Each collection's lane: its state behind a mutex, plus the file path it
/// is persisted to.
struct Lane {
    state: Mutex<CollectionState>,
    path: PathBuf,
}

/// Process-wide collection registry, keyed by collection name. Entries are
/// created lazily on first access and never removed except by `drop`.
pub struct CollectionCache {
    storage_dir: PathBuf,
    lanes: DashMap<String, Arc<Lane>>,
    autosave_stop: Arc<AtomicBool>,
    autosave_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CollectionCache {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Arc<Self> {
        let cache = Arc::new(CollectionCache {
            storage_dir: storage_dir.into(),
            lanes: DashMap::new(),
            autosave_stop: Arc::new(AtomicBool::new(false)),
            autosave_handle: Mutex::new(None),
        });
        cache
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.storage_dir.join(format!("{name}.json"))
    }

    /// Spawn the background autosave thread. `interval_ms == 0` disables it.
    pub fn start_autosave(self: &Arc<Self>, interval_ms: u64) {
        if interval_ms == 0 {
            return;
        }
        let cache = Arc::clone(self);
        let stop = Arc::clone(&self.autosave_stop);
        let handle = thread::spawn(move || loop {
            thread::sleep(Duration::from_millis(interval_ms));
            if stop.load(AtomicOrdering::Relaxed) {
                return;
            }
            cache.flush_dirty();
        });
        *self.autosave_handle.lock() = Some(handle);
    }

    /// Look up (or lazily create) a collection's lane. Creation is atomic:
    /// the `DashMap` shard lock held for the duration of `entry()` means
    /// two threads racing on a collection name that isn't registered yet
    /// can't both win and leave one of them holding an orphaned `Arc<Lane>`
    /// whose writes are never observed again. A racing loser still pays
    /// the cost of loading the file from disk before discovering it lost,
    /// but its `Lane` is simply dropped rather than replacing the winner's.
    fn lane(&self, name: &str) -> Result<Arc<Lane>> {
        if let Some(lane) = self.lanes.get(name) {
            return Ok(Arc::clone(&lane));
        }
        let path = self.file_path(name);
        let state = load_collection(&path)?;
        let lane = Arc::new(Lane {
            state: Mutex::new(state),
            path,
        });
        let entry = self
            .lanes
            .entry(name.to_string())
            .or_insert_with(|| lane);
        Ok(Arc::clone(&entry))
    }

    /// Run `f` against a collection's state under its lane, returning
    /// whatever `f` returns. `f` is responsible for setting `dirty` via the
    /// returned bool.
    pub fn update<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut CollectionState) -> Result<(T, bool)>,
    ) -> Result<T> {
        let lane = self.lane(name)?;
        let mut state = lane.state.lock();
        let (value, changed) = f(&mut state)?;
        if changed {
            state.dirty = true;
        }
        Ok(value)
    }

    /// Locate a document by id, run `f` against a mutable reference, and
    /// re-stamp the index if `f` reports the document changed.
    pub fn update_document<T>(
        &self,
        name: &str,
        id: &str,
        f: impl FnOnce(&mut Document) -> Result<T>,
    ) -> Result<T> {
        self.update(name, |state| {
            let idx = *state
                .id_index
                .get(id)
                .ok_or_else(|| DocStoreError::NotFound(id.to_string()))?;
            let result = f(&mut state.documents[idx])?;
            Ok((result, true))
        })
    }

    /// Remove a document by id. Re-indexes all documents after it to keep
    /// `id_index` coherent with the new positions.
    pub fn remove_document(&self, name: &str, id: &str) -> Result<Document> {
        self.update(name, |state| {
            let idx = *state
                .id_index
                .get(id)
                .ok_or_else(|| DocStoreError::NotFound(id.to_string()))?;
            let removed = state.documents.remove(idx);
            state.reindex();
            Ok((removed, true))
        })
    }

    /// Snapshot every document in a collection (clones; the filter/sort/
    /// project pipeline runs on the snapshot, outside the lane).
    pub fn snapshot(&self, name: &str) -> Result<Vec<Document>> {
        self.update(name, |state| Ok((state.documents.clone(), false)))
    }

    /// Persist a single collection if it is dirty. No-op otherwise.
    pub fn save(&self, name: &str) -> Result<()> {
        let lane = self.lane(name)?;
        let mut state = lane.state.lock();
        if !state.dirty {
            return Ok(());
        }
        atomic_save(&lane.path, &state.documents)?;
        state.dirty = false;
        Ok(())
    }

    fn flush_dirty(&self) {
        let names: Vec<String> = self.lanes.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Err(e) = self.save(&name) {
                crate::log_error!("autosave failed for collection {name}: {e}");
            }
        }
    }

    /// Save every collection, tolerating per-collection failures so one
    /// broken collection doesn't block the rest from flushing. Intended to
    /// run once, at shutdown.
    pub fn flush_all(&self) {
        self.autosave_stop.store(true, AtomicOrdering::Relaxed);
        self.flush_dirty();
    }

    /// Drop a collection entirely: removes the in-memory lane and deletes
    /// its file. Missing files are not an error.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let lane = self.lane(name)?;
        let _state = lane.state.lock();
        match fs::remove_file(&lane.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DocStoreError::StorageError(e.to_string())),
        }
        drop(_state);
        self.lanes.remove(name);
        Ok(())
    }
}

impl Drop for CollectionCache {
    fn drop(&mut self) {
        self.flush_all();
        // The autosave thread observes the stop flag on its next tick; we
        // don't block shutdown waiting for it to wake up.
        drop(self.autosave_handle.lock().take());
    }
}

/// Load a collection from disk. A missing file is an empty, clean
/// collection. A file that fails to parse is logged and treated as empty
/// rather than propagated, so one corrupt collection doesn't take down the
/// whole database handle.
fn load_collection(path: &Path) -> Result<CollectionState> {
    match fs::read_to_string(path) {
        Ok(contents) => match codec::decode_collection(&contents) {
            Ok(documents) => Ok(CollectionState::from_documents(documents)),
            Err(e) => {
                crate::log_error!("collection file {} is corrupt, starting empty: {e}", path.display());
                Ok(CollectionState::from_documents(Vec::new()))
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(CollectionState::from_documents(Vec::new()))
        }
        Err(e) => Err(DocStoreError::StorageError(e.to_string())),
    }
}

/// Write-temp / reopen-and-reparse / rename. The reparse step catches a
/// truncated or otherwise malformed write before it ever becomes the
/// collection's canonical file.
fn atomic_save(path: &Path, documents: &[Document]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let millis = crate::document::now_millis_monotonic();
    let tmp_path = path.with_extension(format!("json.{millis}.tmp"));
    let encoded = codec::encode_collection(documents);

    let write_result = fs::write(&tmp_path, &encoded).map_err(DocStoreError::from).and_then(|()| {
        let verify = fs::read_to_string(&tmp_path)?;
        codec::decode_collection(&verify)?;
        Ok(())
    });

    match write_result {
        Ok(()) => {
            fs::rename(&tmp_path, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}
