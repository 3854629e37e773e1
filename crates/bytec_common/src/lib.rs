//! Shared foundational types for the bytec script-engine runtime.
//!
//! This crate provides the content digest type used across the runtime for
//! cache keys, blob file names, and staleness detection.

#![warn(missing_docs)]

pub mod hash;

pub use hash::{Digest, ParseDigestError};
