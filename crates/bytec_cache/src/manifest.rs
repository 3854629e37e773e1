//! On-disk manifest text format.
//!
//! The manifest is a newline-delimited text file holding the full cache
//! index: two header lines (`v8_version <version>` and `arch <32|64>`)
//! followed by one `<pathHash> <contentHash>` line per cached script. The
//! header lines are coarse invalidation gates; both must match the running
//! process exactly or the whole file, and with it the whole cache
//! directory, is discarded. Entry order is unspecified and insignificant.

use std::collections::HashMap;
use std::fmt::Write as _;

use bytec_common::Digest;

use crate::error::ManifestError;

/// Key of the first header line.
const VERSION_KEY: &str = "v8_version";

/// Key of the second header line.
const ARCH_KEY: &str = "arch";

/// The two validation gates written at the top of every manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestHeader {
    /// VM version string of the engine that produced the cache.
    pub vm_version: String,

    /// Pointer width, in bits, of the process that produced the cache.
    pub arch_bits: u32,
}

impl ManifestHeader {
    /// Header for the running process: the given VM version and the
    /// process pointer width.
    pub fn current(vm_version: impl Into<String>) -> Self {
        Self {
            vm_version: vm_version.into(),
            arch_bits: usize::BITS,
        }
    }
}

/// Parses and validates a manifest against the running process.
///
/// Validation order is fixed: the version line first, then the arch line,
/// then the free-form entry lines; later lines are only trusted once the
/// two gates have passed. Any anomaly anywhere discards the entire parse,
/// entries read before the failure included.
pub fn parse(
    text: &str,
    current: &ManifestHeader,
) -> Result<HashMap<Digest, Digest>, ManifestError> {
    let mut entries = HashMap::new();
    let mut line_no = 0;

    for line in text.lines() {
        line_no += 1;
        let (key, value) = key_value(line, line_no)?;
        match line_no {
            1 => check_version(key, value, current)?,
            2 => check_arch(key, value, current, line_no)?,
            _ => {
                let path_hash: Digest = key.parse().map_err(|e| ManifestError::Malformed {
                    line: line_no,
                    reason: format!("bad path hash: {e}"),
                })?;
                let content_hash: Digest = value.parse().map_err(|e| ManifestError::Malformed {
                    line: line_no,
                    reason: format!("bad content hash: {e}"),
                })?;
                if entries.insert(path_hash, content_hash).is_some() {
                    return Err(ManifestError::Malformed {
                        line: line_no,
                        reason: format!("duplicate path hash {path_hash}"),
                    });
                }
            }
        }
    }

    if line_no < 2 {
        return Err(ManifestError::Malformed {
            line: line_no,
            reason: "incomplete header".to_string(),
        });
    }
    Ok(entries)
}

/// Serializes a header and an index snapshot to manifest text.
///
/// Emits the two header lines, then one line per entry in unspecified
/// order, every line newline-terminated.
pub fn serialize(header: &ManifestHeader, entries: &[(Digest, Digest)]) -> String {
    let mut out = String::with_capacity(64 + entries.len() * (Digest::HEX_LEN * 2 + 2));
    // Writing to a String cannot fail.
    let _ = writeln!(out, "{VERSION_KEY} {}", header.vm_version);
    let _ = writeln!(out, "{ARCH_KEY} {}", header.arch_bits);
    for (path_hash, content_hash) in entries {
        let _ = writeln!(out, "{path_hash} {content_hash}");
    }
    out
}

/// Splits one manifest line into exactly two whitespace-separated tokens.
///
/// Leading spaces and tabs are stripped and separator runs collapse, so
/// `"  a \t b"` parses the same as `"a b"`. Any other token count is a
/// malformed line.
fn key_value(line: &str, line_no: usize) -> Result<(&str, &str), ManifestError> {
    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(key), Some(value), None) => Ok((key, value)),
        _ => Err(ManifestError::Malformed {
            line: line_no,
            reason: format!("expected exactly two fields in {:?}", line.trim_end()),
        }),
    }
}

fn check_version(key: &str, value: &str, current: &ManifestHeader) -> Result<(), ManifestError> {
    if key != VERSION_KEY {
        return Err(ManifestError::Malformed {
            line: 1,
            reason: format!("expected `{VERSION_KEY}` key, got `{key}`"),
        });
    }
    if value != current.vm_version {
        return Err(ManifestError::VersionMismatch {
            expected: current.vm_version.clone(),
            found: value.to_string(),
        });
    }
    Ok(())
}

fn check_arch(
    key: &str,
    value: &str,
    current: &ManifestHeader,
    line_no: usize,
) -> Result<(), ManifestError> {
    if key != ARCH_KEY {
        return Err(ManifestError::Malformed {
            line: line_no,
            reason: format!("expected `{ARCH_KEY}` key, got `{key}`"),
        });
    }
    if value.parse::<u32>().ok() != Some(current.arch_bits) {
        return Err(ManifestError::ArchMismatch {
            expected: current.arch_bits,
            found: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ManifestHeader {
        ManifestHeader {
            vm_version: "11.3.244.8".to_string(),
            arch_bits: 64,
        }
    }

    fn entry(path: &str, content: &str) -> (Digest, Digest) {
        (
            Digest::from_bytes(path.as_bytes()),
            Digest::from_bytes(content.as_bytes()),
        )
    }

    #[test]
    fn current_header_uses_pointer_width() {
        let h = ManifestHeader::current("11.3.244.8");
        assert_eq!(h.arch_bits, usize::BITS);
        assert_eq!(h.vm_version, "11.3.244.8");
    }

    #[test]
    fn serialize_parse_roundtrip() {
        let h = header();
        let entries = vec![entry("a.js", "src a"), entry("b.js", "src b")];
        let text = serialize(&h, &entries);
        let parsed = parse(&text, &h).unwrap();
        assert_eq!(parsed.len(), 2);
        for (path_hash, content_hash) in &entries {
            assert_eq!(parsed.get(path_hash), Some(content_hash));
        }
    }

    #[test]
    fn serialize_header_lines_first() {
        let h = header();
        let text = serialize(&h, &[entry("a.js", "src a")]);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("v8_version 11.3.244.8"));
        assert_eq!(lines.next(), Some("arch 64"));
        assert!(lines.next().is_some());
        assert!(lines.next().is_none());
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn header_only_manifest_is_empty_index() {
        let h = header();
        let parsed = parse("v8_version 11.3.244.8\narch 64\n", &h).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn missing_final_newline_accepted() {
        let h = header();
        let (p, c) = entry("a.js", "src a");
        let text = format!("v8_version 11.3.244.8\narch 64\n{p} {c}");
        let parsed = parse(&text, &h).unwrap();
        assert_eq!(parsed.get(&p), Some(&c));
    }

    #[test]
    fn leading_and_redundant_whitespace_collapsed() {
        let h = header();
        let (p, c) = entry("a.js", "src a");
        let text = format!("  \tv8_version   11.3.244.8\n\tarch  64\n {p} \t {c}\n");
        let parsed = parse(&text, &h).unwrap();
        assert_eq!(parsed.get(&p), Some(&c));
    }

    #[test]
    fn version_mismatch_rejected() {
        let err = parse("v8_version 10.8.168.25\narch 64\n", &header()).unwrap_err();
        assert!(matches!(err, ManifestError::VersionMismatch { .. }));
    }

    #[test]
    fn wrong_version_key_rejected() {
        let err = parse("vm_version 11.3.244.8\narch 64\n", &header()).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { line: 1, .. }));
    }

    #[test]
    fn arch_mismatch_rejected_both_directions() {
        let text_32 = "v8_version 11.3.244.8\narch 32\n";
        let text_64 = "v8_version 11.3.244.8\narch 64\n";

        let on_64 = header();
        assert!(matches!(
            parse(text_32, &on_64).unwrap_err(),
            ManifestError::ArchMismatch { expected: 64, .. }
        ));
        assert!(parse(text_64, &on_64).is_ok());

        let on_32 = ManifestHeader {
            arch_bits: 32,
            ..header()
        };
        assert!(matches!(
            parse(text_64, &on_32).unwrap_err(),
            ManifestError::ArchMismatch { expected: 32, .. }
        ));
        assert!(parse(text_32, &on_32).is_ok());
    }

    #[test]
    fn non_numeric_arch_rejected() {
        let err = parse("v8_version 11.3.244.8\narch unknown\n", &header()).unwrap_err();
        assert!(matches!(err, ManifestError::ArchMismatch { .. }));
    }

    #[test]
    fn wrong_arch_key_rejected() {
        // Pre-arch manifests have an entry line where the arch line belongs.
        let err = parse("v8_version 11.3.244.8\naabb ccdd\n", &header()).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { line: 2, .. }));
    }

    #[test]
    fn wrong_token_count_rejected() {
        let h = header();
        let one = "v8_version 11.3.244.8\narch 64\nlonelytoken\n";
        assert!(matches!(
            parse(one, &h).unwrap_err(),
            ManifestError::Malformed { line: 3, .. }
        ));

        let three = "v8_version 11.3.244.8 extra\narch 64\n";
        assert!(matches!(
            parse(three, &h).unwrap_err(),
            ManifestError::Malformed { line: 1, .. }
        ));
    }

    #[test]
    fn blank_line_rejected() {
        let text = "v8_version 11.3.244.8\narch 64\n\n";
        let err = parse(text, &header()).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { line: 3, .. }));
    }

    #[test]
    fn bad_entry_digest_rejected() {
        let text = "v8_version 11.3.244.8\narch 64\nnot-a-digest alsobad\n";
        let err = parse(text, &header()).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { line: 3, .. }));
    }

    #[test]
    fn duplicate_path_hash_rejected() {
        let h = header();
        let (p, c) = entry("a.js", "src a");
        let text = format!("v8_version 11.3.244.8\narch 64\n{p} {c}\n{p} {c}\n");
        let err = parse(&text, &h).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { line: 4, .. }));
    }

    #[test]
    fn empty_and_truncated_manifests_rejected() {
        let h = header();
        assert!(matches!(
            parse("", &h).unwrap_err(),
            ManifestError::Malformed { line: 0, .. }
        ));
        assert!(matches!(
            parse("v8_version 11.3.244.8\n", &h).unwrap_err(),
            ManifestError::Malformed { line: 1, .. }
        ));
    }
}
