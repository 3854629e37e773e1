//! Persistent, content-addressed cache for compiled script bytecode.
//!
//! An embedding script engine asks this crate, on every script load, whether
//! valid precompiled bytecode exists for the source it is about to compile,
//! and records fresh compilation results so the next run can skip the
//! compiler entirely. Entries survive process restarts through a versioned
//! text manifest plus one blob file per script; any manifest anomaly (VM
//! version change, pointer-width change, corruption) invalidates the whole
//! cache directory at once rather than individual entries.
//!
//! All file commits go through a write-to-temp-then-rename protocol, so a
//! crash at any point leaves at most an orphaned `.tmp` file and never a
//! half-written committed file.

#![warn(missing_docs)]

pub mod blob;
pub mod cache;
pub mod error;
pub mod index;
pub mod manifest;
pub mod worker;

pub use blob::{Blob, BlobStore};
pub use bytec_common::Digest;
pub use cache::BytecodeCache;
pub use error::{CacheError, ManifestError};
pub use index::CacheIndex;
pub use manifest::ManifestHeader;
pub use worker::WriteQueue;
