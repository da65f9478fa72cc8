//! Integrity verification: re-hash every entry, fetched or reused, and
//! aggregate every mismatch before the unpack gate is evaluated.
//!
//! A locally present file may have been corrupted outside the pipeline's
//! knowledge, so reused entries are never exempt from this pass.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::cache::CacheEntry;
use crate::error::KilnError;

/// One entry whose computed hash disagrees with the manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashMismatch {
    pub logical_path: String,
    pub expected_hash: String,
    pub actual_hash: String,
}

/// Streaming SHA-256 of a file, rendered as lowercase hex.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Re-hash every entry concurrently and join. The returned mismatches are
/// ordered by logical path and cover the entire entry set, never just the
/// first failure; empty means the set is fit to unpack.
pub fn verify_entries(entries: &[CacheEntry]) -> Result<Vec<HashMismatch>, KilnError> {
    let mut mismatches: Vec<HashMismatch> = entries
        .par_iter()
        .map(|entry| {
            let actual = hash_file(&entry.cache_file)
                .map_err(|e| KilnError::cache_io("verify entry", &entry.cache_file, e))?;
            if actual == entry.expected_hash {
                Ok(None)
            } else {
                Ok(Some(HashMismatch {
                    logical_path: entry.logical_path.clone(),
                    expected_hash: entry.expected_hash.clone(),
                    actual_hash: actual,
                }))
            }
        })
        .collect::<Result<Vec<_>, KilnError>>()?
        .into_iter()
        .flatten()
        .collect();
    mismatches.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
    Ok(mismatches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheState;

    #[test]
    fn test_hash_file_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.bin");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_entries_orders_mismatches_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut entries = Vec::new();
        for (logical_path, content) in [("z/last", "zz"), ("a/first", "aa")] {
            let file = dir.path().join(logical_path.replace('/', "_"));
            std::fs::write(&file, content).unwrap();
            entries.push(CacheEntry {
                logical_path: logical_path.to_string(),
                expected_hash: "0".repeat(64),
                cache_file: file,
                state: CacheState::Present,
            });
        }

        let report = verify_entries(&entries).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].logical_path, "a/first");
        assert_eq!(report[1].logical_path, "z/last");
        assert_eq!(report[0].actual_hash, hash_file(&entries[1].cache_file).unwrap());
    }

    #[test]
    fn test_verify_entries_accepts_matching_set() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("part.jar");
        std::fs::write(&file, b"payload").unwrap();
        let entries = vec![CacheEntry {
            logical_path: "core/util".to_string(),
            expected_hash: hash_file(&file).unwrap(),
            cache_file: file,
            state: CacheState::Present,
        }];

        assert!(verify_entries(&entries).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_entry_is_cache_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![CacheEntry {
            logical_path: "core/util".to_string(),
            expected_hash: "0".repeat(64),
            cache_file: dir.path().join("missing.jar"),
            state: CacheState::Present,
        }];

        assert!(matches!(
            verify_entries(&entries).unwrap_err(),
            KilnError::CacheIo { .. }
        ));
    }
}
