//! Bytecode blobs and atomic file persistence.
//!
//! A [`Blob`] is the in-memory form of one cached compilation result; a
//! [`BlobStore`] moves blob (and manifest) bytes to and from disk. Writes
//! follow a write-to-temp-then-rename protocol so that a committed file is
//! always complete: a crash or failure at any stage leaves at most an
//! orphaned `.tmp` file and never a half-written destination.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytec_common::Digest;
use tracing::{debug, warn};

use crate::error::CacheError;

/// An owned bytecode payload labeled by the path hash it is stored under.
///
/// A blob has exactly one owner; it is either constructed by taking
/// ownership of an existing buffer or by copying a borrowed one. Its
/// on-disk form is the raw payload, no header, in a file named by the
/// path hash.
pub struct Blob {
    path_hash: Digest,
    bytes: Vec<u8>,
}

impl Blob {
    /// Wraps an already-owned buffer without copying.
    pub fn from_vec(path_hash: Digest, bytes: Vec<u8>) -> Self {
        Self { path_hash, bytes }
    }

    /// Copies the caller's buffer into a fresh allocation.
    pub fn copied_from(path_hash: Digest, bytes: &[u8]) -> Self {
        Self {
            path_hash,
            bytes: bytes.to_vec(),
        }
    }

    /// The path hash this blob is keyed and filed under.
    pub fn path_hash(&self) -> Digest {
        self.path_hash
    }

    /// The bytecode payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consumes the blob, yielding the payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Atomic writer and best-effort reader for files in a cache directory.
///
/// Every store that can touch the same directory must share one rename
/// lock: the commit step (rename over the destination) and the failure
/// cleanup (temp file removal) are serialized process-wide, across manager
/// instances and worker threads, so two writers never race on the same
/// filesystem-visible temp path.
#[derive(Clone)]
pub struct BlobStore {
    rename_lock: Arc<Mutex<()>>,
}

impl BlobStore {
    /// Creates a store that commits under the given process-wide lock.
    pub fn new(rename_lock: Arc<Mutex<()>>) -> Self {
        Self { rename_lock }
    }

    /// Writes `bytes` to `path` atomically via a `.tmp` sibling.
    ///
    /// The payload is fully written and flushed to `<path>.tmp` first; any
    /// failure there removes the temp file and leaves `path` untouched.
    /// Only a complete temp file is renamed over the destination, and a
    /// rename failure likewise removes the temp file, preserving whatever
    /// was previously committed.
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let tmp = tmp_path(path);
        let written = write_fully(&tmp, bytes);

        let _commit = self.rename_lock.lock().unwrap();
        match written {
            Ok(()) => match fs::rename(&tmp, path) {
                Ok(()) => {
                    debug!(path = %path.display(), len = bytes.len(), "blob committed");
                    Ok(())
                }
                Err(source) => {
                    warn!(from = %tmp.display(), to = %path.display(), %source, "rename failed");
                    remove_tmp(&tmp);
                    Err(CacheError::Commit {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            },
            Err(source) => {
                remove_tmp(&tmp);
                Err(CacheError::Io { path: tmp, source })
            }
        }
    }

    /// Reads a committed file in full.
    ///
    /// Any failure (missing file, unreadable file) is a `None`; reads are
    /// always best-effort misses, never errors.
    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(source) => {
                debug!(path = %path.display(), %source, "blob not readable");
                None
            }
        }
    }
}

/// `<path>.tmp`, appended rather than substituted so a manifest name with
/// its own extension keeps it.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_fully(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

fn remove_tmp(tmp: &Path) {
    if let Err(source) = fs::remove_file(tmp) {
        debug!(path = %tmp.display(), %source, "temp file removal failed");
    }
}
