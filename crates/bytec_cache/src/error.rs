//! Error types for cache operations.

use std::path::PathBuf;

/// Errors from blob and manifest file writes.
///
/// Read paths are fail-safe and surface misses rather than errors; this enum
/// is used for internal propagation on the write side, where the cache
/// facade collapses it to a boolean result for the host.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while writing a cache file.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The atomic rename of a temp file over its destination failed.
    ///
    /// Whatever was previously committed at the destination is untouched.
    #[error("failed to commit {path}: {source}")]
    Commit {
        /// The destination path that was not replaced.
        path: PathBuf,
        /// The underlying rename error.
        source: std::io::Error,
    },
}

/// Reasons a manifest fails validation.
///
/// Every variant is handled identically by the cache facade (wholesale
/// wipe of the cache directory); the distinctions exist for logging.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// A line did not match the `<key> <value>` shape, held an invalid
    /// digest, repeated a path hash, or a header line was missing.
    #[error("malformed manifest at line {line}: {reason}")]
    Malformed {
        /// 1-based line number of the offending line.
        line: usize,
        /// Description of the problem.
        reason: String,
    },

    /// The manifest was produced by a different VM version.
    #[error("VM version mismatch: manifest has {found}, runtime is {expected}")]
    VersionMismatch {
        /// The running VM version.
        expected: String,
        /// The version recorded in the manifest.
        found: String,
    },

    /// The manifest was produced under a different pointer width.
    #[error("arch mismatch: manifest has {found}, process is {expected}-bit")]
    ArchMismatch {
        /// The running process pointer width in bits.
        expected: u32,
        /// The width value recorded in the manifest.
        found: String,
    },
}
