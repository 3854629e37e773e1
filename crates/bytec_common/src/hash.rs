//! Content hashing for cache keys and staleness detection.

use std::fmt;
use std::str::FromStr;

/// A 128-bit content digest computed using XXH3, rendered as 32 lowercase
/// hex characters.
///
/// The cache applies the same digest function in two domains that are never
/// compared against each other: digests of script paths (cache keys, also
/// used as blob file names) and digests of script source bytes (used to
/// detect that a source changed since its bytecode was cached).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 16]);

impl Digest {
    /// Number of characters in the hex rendering.
    pub const HEX_LEN: usize = 32;

    /// Computes the digest of a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Error produced when parsing a [`Digest`] from its hex rendering.
#[derive(Debug, thiserror::Error)]
pub enum ParseDigestError {
    /// The input was not exactly [`Digest::HEX_LEN`] characters long.
    #[error("digest must be 32 hex characters, got {0}")]
    Length(usize),

    /// The input contained a character that is not a hex digit.
    #[error("digest contains non-hex character {0:?}")]
    InvalidChar(char),
}

impl FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(c) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(ParseDigestError::InvalidChar(c));
        }
        if s.len() != Self::HEX_LEN {
            return Err(ParseDigestError::Length(s.len()));
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            // All-hexdigit input was checked above, so this cannot fail.
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseDigestError::Length(s.len()))?;
        }
        Ok(Self(bytes))
    }
}
