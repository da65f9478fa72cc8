//! Structured error types for the compile-parts pipeline.
//!
//! Every variant is fatal to the run: there is no mode in which a subset of
//! entries silently succeeds while others are skipped.

use std::fmt;

use crate::verify::HashMismatch;

/// Main error type for kiln operations
#[derive(Debug, Clone)]
pub enum KilnError {
    /// Missing, unparsable, or internally inconsistent manifest
    Manifest {
        path: Option<String>,
        reason: String,
    },
    /// Fetch failure for a single entry; aborts the whole fetch stage
    Network {
        logical_path: String,
        url: String,
        source: String,
    },
    /// Post-fetch hash mismatches, aggregated across the whole entry set
    Integrity { mismatches: Vec<HashMismatch> },
    /// Unreadable or corrupt archive during unpack
    Extraction {
        logical_path: String,
        source: String,
    },
    /// Filesystem failure in the cache store or output tree
    CacheIo {
        operation: String,
        path: String,
        source: String,
    },
}

impl KilnError {
    pub(crate) fn cache_io(operation: &str, path: &std::path::Path, source: impl fmt::Display) -> Self {
        KilnError::CacheIo {
            operation: operation.to_string(),
            path: path.display().to_string(),
            source: source.to_string(),
        }
    }
}

impl fmt::Display for KilnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KilnError::Manifest { path, reason } => {
                write!(f, "Manifest error: {}", reason)?;
                if let Some(path) = path {
                    write!(f, " (manifest: {})", path)?;
                }
                Ok(())
            }
            KilnError::Network {
                logical_path,
                url,
                source,
            } => {
                write!(
                    f,
                    "Network error fetching {}: {} (url: {})",
                    logical_path, source, url
                )
            }
            KilnError::Integrity { mismatches } => {
                let noun = if mismatches.len() == 1 { "entry" } else { "entries" };
                write!(f, "Integrity check failed for {} {}:", mismatches.len(), noun)?;
                for m in mismatches {
                    write!(
                        f,
                        "\n  {} (expected {}, got {})",
                        m.logical_path, m.expected_hash, m.actual_hash
                    )?;
                }
                Ok(())
            }
            KilnError::Extraction {
                logical_path,
                source,
            } => {
                write!(f, "Extraction error for {}: {}", logical_path, source)
            }
            KilnError::CacheIo {
                operation,
                path,
                source,
            } => {
                write!(f, "Cache I/O error in {}: {} (path: {})", operation, source, path)
            }
        }
    }
}

impl std::error::Error for KilnError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_display_lists_every_mismatch() {
        let error = KilnError::Integrity {
            mismatches: vec![
                HashMismatch {
                    logical_path: "core/util".to_string(),
                    expected_hash: "aa".repeat(32),
                    actual_hash: "bb".repeat(32),
                },
                HashMismatch {
                    logical_path: "platform/lang".to_string(),
                    expected_hash: "cc".repeat(32),
                    actual_hash: "dd".repeat(32),
                },
            ],
        };

        let display = format!("{}", error);
        assert!(display.contains("2 entries"));
        assert!(display.contains("core/util"));
        assert!(display.contains("platform/lang"));
        assert!(display.contains(&"aa".repeat(32)));
        assert!(display.contains(&"dd".repeat(32)));
    }

    #[test]
    fn test_network_display_names_failing_path() {
        let error = KilnError::Network {
            logical_path: "core/util".to_string(),
            url: "https://cache.example.com/parts/core/util/ab.jar".to_string(),
            source: "connection refused".to_string(),
        };

        let display = format!("{}", error);
        assert!(display.contains("core/util"));
        assert!(display.contains("connection refused"));
    }
}
