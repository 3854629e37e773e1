//! High-level cache facade.
//!
//! [`BytecodeCache`] ties the manifest codec, in-memory index, blob store,
//! and background write queue together behind the four operations the host
//! script engine calls: `init`, `lookup`, `store`/`store_async`, `destroy`.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytec_common::Digest;
use tracing::{debug, info, warn};

use crate::blob::{Blob, BlobStore};
use crate::index::CacheIndex;
use crate::manifest::{self, ManifestHeader};
use crate::worker::WriteQueue;

/// Facade over the persistent bytecode cache.
///
/// Lifecycle is `init`, then any number of `lookup`/`store`/`store_async`,
/// then `destroy`. `destroy` is valid (and a no-op) before `init` and is
/// idempotent. State reachable from background write jobs lives behind an
/// `Arc` that each job captures by value, so an in-flight async write keeps
/// that state alive even after the caller drops its handle; teardown with
/// writes outstanding is deferred, never a use-after-free.
pub struct BytecodeCache {
    shared: Arc<Shared>,
    queue: Arc<WriteQueue>,
    rename_lock: Arc<Mutex<()>>,
}

/// State captured by background write jobs.
struct Shared {
    index: CacheIndex,
    session: Mutex<Option<Session>>,
}

/// Configuration fixed at `init` and retired by `destroy`.
struct Session {
    cache_dir: PathBuf,
    manifest_name: String,
    header: ManifestHeader,
    async_writes: bool,
    store: BlobStore,
}

impl Session {
    fn blob_path(&self, path_hash: Digest) -> PathBuf {
        self.cache_dir.join(path_hash.to_string())
    }

    fn manifest_path(&self) -> PathBuf {
        self.cache_dir.join(&self.manifest_name)
    }
}

impl BytecodeCache {
    /// Creates an uninitialized cache manager.
    ///
    /// The write queue and rename lock are process-wide collaborators:
    /// every manager that may touch the same cache directory must be handed
    /// the same two handles, or concurrent commits could race on
    /// filesystem-visible temp files.
    pub fn new(queue: Arc<WriteQueue>, rename_lock: Arc<Mutex<()>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                index: CacheIndex::new(),
                session: Mutex::new(None),
            }),
            queue,
            rename_lock,
        }
    }

    /// Digest of a script path, as used for cache keys and blob file names.
    ///
    /// `lookup` computes this internally; hosts that go on to call `store`
    /// for the same script use this to derive the key once.
    pub fn path_digest(script_path: &str) -> Digest {
        Digest::from_bytes(script_path.as_bytes())
    }

    /// Loads the cache session from disk.
    ///
    /// Ensures `cache_dir` exists, then reads and validates the manifest.
    /// Returns `true` only when a valid manifest was loaded. A missing
    /// manifest is a cold start: the session is still installed (entries
    /// stored this run are saved at `destroy`) but no cached bytecode is
    /// available, so `false` is returned. A manifest that fails validation
    /// invalidates the whole cache: the index is cleared and the directory
    /// is removed and recreated, blobs included.
    pub fn init(
        &self,
        cache_dir: impl Into<PathBuf>,
        manifest_name: impl Into<String>,
        vm_version: impl Into<String>,
        async_writes: bool,
    ) -> bool {
        let cache_dir = cache_dir.into();
        let manifest_name = manifest_name.into();
        let vm_version = vm_version.into();
        debug_assert!(!cache_dir.as_os_str().is_empty());
        debug_assert!(!manifest_name.is_empty());
        debug_assert!(!vm_version.is_empty());

        self.shared.index.clear();

        if let Err(source) = fs::create_dir_all(&cache_dir) {
            warn!(dir = %cache_dir.display(), %source, "cannot create cache directory, caching disabled");
            return false;
        }

        let header = ManifestHeader::current(vm_version);
        let manifest_path = cache_dir.join(&manifest_name);
        let session = Session {
            cache_dir: cache_dir.clone(),
            manifest_name,
            header: header.clone(),
            async_writes,
            store: BlobStore::new(Arc::clone(&self.rename_lock)),
        };
        *self.shared.session.lock().unwrap() = Some(session);

        let text = match fs::read_to_string(&manifest_path) {
            Ok(text) => text,
            Err(source) => {
                info!(path = %manifest_path.display(), %source, "no manifest, cold start");
                return false;
            }
        };

        match manifest::parse(&text, &header) {
            Ok(entries) => {
                info!(entries = entries.len(), dir = %cache_dir.display(), "manifest loaded");
                self.shared.index.load(entries);
                true
            }
            Err(err) => {
                warn!(%err, dir = %cache_dir.display(), "manifest rejected, wiping cache directory");
                self.shared.index.clear();
                if let Err(source) = fs::remove_dir_all(&cache_dir) {
                    warn!(dir = %cache_dir.display(), %source, "cache directory removal failed");
                }
                if let Err(source) = fs::create_dir_all(&cache_dir) {
                    warn!(dir = %cache_dir.display(), %source, "cache directory recreation failed");
                }
                false
            }
        }
    }

    /// Looks up precompiled bytecode for a script about to be loaded.
    ///
    /// Returns the cached blob only when the index knows the path and the
    /// recorded content hash matches `script_bytes`. A changed source, a
    /// blob file missing despite its index entry, and an unknown path are
    /// all plain misses; a stale index entry stays in place until the next
    /// successful `store` for that path overwrites it.
    pub fn lookup(&self, script_path: &str, script_bytes: &[u8]) -> Option<Blob> {
        debug_assert!(!script_path.is_empty());
        debug_assert!(!script_bytes.is_empty());

        let path_hash = Self::path_digest(script_path);
        let stored = self.shared.index.get(&path_hash)?;
        if Digest::from_bytes(script_bytes) != stored {
            debug!(%path_hash, script = script_path, "source changed, ignoring cached bytecode");
            return None;
        }

        let (blob_path, store) = self.write_target(path_hash)?;
        let bytes = store.read(&blob_path)?;
        Some(Blob::from_vec(path_hash, bytes))
    }

    /// Persists freshly compiled bytecode, blocking until the write commits.
    ///
    /// `content_hash` may be supplied when the caller already computed it;
    /// otherwise it is derived from `script_bytes`. The index entry is
    /// updated and the session marked dirty only after the blob write
    /// succeeds; a failed write leaves both untouched.
    pub fn store(
        &self,
        path_hash: Digest,
        content_hash: Option<Digest>,
        bytecode: &[u8],
        script_bytes: &[u8],
    ) -> bool {
        debug_assert!(!bytecode.is_empty());
        debug_assert!(!script_bytes.is_empty());

        let Some((blob_path, store)) = self.write_target(path_hash) else {
            return false;
        };
        let content_hash = content_hash.unwrap_or_else(|| Digest::from_bytes(script_bytes));
        let blob = Blob::copied_from(path_hash, bytecode);
        self.shared.commit_blob(&store, &blob_path, &blob, content_hash)
    }

    /// Persists freshly compiled bytecode on the background worker.
    ///
    /// Performs the same sequence as [`store`](Self::store), queued behind
    /// every previously submitted write. The callback receives the outcome
    /// and runs on the worker thread; callers must not assume thread
    /// affinity. The job's capture of the shared state keeps it alive while
    /// the write is in flight.
    pub fn store_async<F>(
        &self,
        path_hash: Digest,
        content_hash: Option<Digest>,
        bytecode: &[u8],
        script_bytes: &[u8],
        callback: F,
    ) where
        F: FnOnce(bool) + Send + 'static,
    {
        debug_assert!(!bytecode.is_empty());
        debug_assert!(!script_bytes.is_empty());

        let Some((blob_path, store)) = self.write_target(path_hash) else {
            callback(false);
            return;
        };
        let content_hash = content_hash.unwrap_or_else(|| Digest::from_bytes(script_bytes));
        let blob = Blob::copied_from(path_hash, bytecode);
        let shared = Arc::clone(&self.shared);
        self.queue.submit(move || {
            let ok = shared.commit_blob(&store, &blob_path, &blob, content_hash);
            callback(ok);
        });
    }

    /// Flushes the index to the manifest and retires the session.
    ///
    /// A clean session (no successful store since the last manifest load)
    /// performs no filesystem writes, and subsequent calls are no-ops. With
    /// async writes enabled at `init` the save is queued behind any
    /// in-flight stores and snapshots the index when it runs, so it
    /// observes every store submitted before it.
    pub fn destroy(&self) {
        let Some(session) = self.shared.session.lock().unwrap().take() else {
            return;
        };
        if !self.shared.index.is_dirty() {
            debug!("cache session clean, skipping manifest save");
            return;
        }

        info!(path = %session.manifest_path().display(), deferred = session.async_writes, "saving manifest");
        if session.async_writes {
            let shared = Arc::clone(&self.shared);
            self.queue.submit(move || save_manifest(&shared.index, &session));
        } else {
            save_manifest(&self.shared.index, &session);
        }
    }

    /// Blob path and store handle for the current session, if initialized.
    fn write_target(&self, path_hash: Digest) -> Option<(PathBuf, BlobStore)> {
        let guard = self.shared.session.lock().unwrap();
        let session = guard.as_ref()?;
        Some((session.blob_path(path_hash), session.store.clone()))
    }
}

impl Shared {
    /// Writes one blob and, only on success, records it in the index and
    /// marks the session dirty.
    fn commit_blob(
        &self,
        store: &BlobStore,
        blob_path: &std::path::Path,
        blob: &Blob,
        content_hash: Digest,
    ) -> bool {
        match store.write_atomic(blob_path, blob.bytes()) {
            Ok(()) => {
                self.index.set(blob.path_hash(), content_hash);
                self.index.mark_dirty();
                true
            }
            Err(err) => {
                warn!(%err, path_hash = %blob.path_hash(), "bytecode store failed");
                false
            }
        }
    }
}

fn save_manifest(index: &CacheIndex, session: &Session) {
    let path = session.manifest_path();
    let text = manifest::serialize(&session.header, &index.snapshot());
    match session.store.write_atomic(&path, text.as_bytes()) {
        Ok(()) => info!(path = %path.display(), entries = index.len(), "manifest saved"),
        Err(err) => warn!(%err, path = %path.display(), "manifest save failed"),
    }
}
