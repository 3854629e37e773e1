//! In-memory path-hash to content-hash index.

use std::collections::HashMap;
use std::sync::Mutex;

use bytec_common::Digest;

/// Thread-safe mapping from path hash to content hash, plus the session
/// dirty flag.
///
/// One mutex guards both pieces of state: the cache facade updates an entry
/// and marks the session dirty only after the corresponding blob write has
/// committed, and the manifest save path snapshots the map under the same
/// lock. [`set`](Self::set) itself never touches the dirty flag.
#[derive(Default)]
pub struct CacheIndex {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Digest, Digest>,
    dirty: bool,
}

impl CacheIndex {
    /// Creates an empty, clean index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the content hash recorded for a path hash.
    pub fn get(&self, path_hash: &Digest) -> Option<Digest> {
        self.inner.lock().unwrap().entries.get(path_hash).copied()
    }

    /// Inserts or overwrites one entry. Does not mark the session dirty.
    pub fn set(&self, path_hash: Digest, content_hash: Digest) {
        self.inner
            .lock()
            .unwrap()
            .entries
            .insert(path_hash, content_hash);
    }

    /// Drops all entries and clears the dirty flag.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.dirty = false;
    }

    /// Replaces the contents with entries loaded from a manifest.
    ///
    /// Freshly loaded state is clean by definition.
    pub fn load(&self, entries: HashMap<Digest, Digest>) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries = entries;
        inner.dirty = false;
    }

    /// Marks the session dirty: at least one store succeeded since the last
    /// manifest load or save.
    pub fn mark_dirty(&self) {
        self.inner.lock().unwrap().dirty = true;
    }

    /// Whether any store succeeded since the last manifest load.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().unwrap().dirty
    }

    /// Copies out all entries, in no particular order, for serialization.
    pub fn snapshot(&self) -> Vec<(Digest, Digest)> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().entries.is_empty()
    }
}
