//! Materializes verified archives into the output tree.
//!
//! The destination root is cleared in full before anything is written, so a
//! previous cache generation or an aborted run can never leak into the
//! result. Per-entry extraction order is unconstrained; destination
//! subdirectories are disjoint.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use rayon::prelude::*;
use zip::ZipArchive;

use crate::cache::CacheEntry;
use crate::error::KilnError;

/// Extract every entry's archive into `{outputRoot}/{logicalPath}/`.
/// Callers must have verified the entry set first.
pub fn unpack_all(entries: &[CacheEntry], output_root: &Path) -> Result<(), KilnError> {
    if output_root.exists() {
        fs::remove_dir_all(output_root)
            .map_err(|e| KilnError::cache_io("clear output root", output_root, e))?;
    }
    fs::create_dir_all(output_root)
        .map_err(|e| KilnError::cache_io("create output root", output_root, e))?;

    entries.par_iter().try_for_each(|entry| {
        let dest = output_root.join(&entry.logical_path);
        fs::create_dir_all(&dest)
            .map_err(|e| KilnError::cache_io("create output directory", &dest, e))?;
        extract_archive(entry, &dest)
    })
}

fn extract_archive(entry: &CacheEntry, dest: &Path) -> Result<(), KilnError> {
    let fail = |source: String| KilnError::Extraction {
        logical_path: entry.logical_path.clone(),
        source,
    };

    let file = File::open(&entry.cache_file)
        .map_err(|e| fail(format!("cannot open archive: {}", e)))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| fail(format!("cannot read archive: {}", e)))?;

    for index in 0..archive.len() {
        let mut part = archive.by_index(index).map_err(|e| fail(e.to_string()))?;
        let Some(relative) = part.enclosed_name() else {
            return Err(fail(format!("entry escapes destination: {}", part.name())));
        };
        let target = dest.join(&relative);
        if part.is_dir() {
            fs::create_dir_all(&target).map_err(|e| fail(e.to_string()))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }
        let mut out = File::create(&target)
            .map_err(|e| fail(format!("cannot create {}: {}", target.display(), e)))?;
        io::copy(&mut part, &mut out).map_err(|e| fail(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheState;
    use crate::testutil::write_jar;

    fn entry_for(dir: &Path, logical_path: &str, files: &[(&str, &[u8])]) -> CacheEntry {
        let jar = dir.join(format!("{}.jar", logical_path.replace('/', "_")));
        write_jar(&jar, files);
        CacheEntry {
            logical_path: logical_path.to_string(),
            expected_hash: "0".repeat(64),
            cache_file: jar,
            state: CacheState::Present,
        }
    }

    #[test]
    fn test_unpack_materializes_each_entry_under_its_logical_path() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            entry_for(
                dir.path(),
                "core/util",
                &[("com/example/A.class", b"alpha" as &[u8]), ("META-INF/MANIFEST.MF", b"mf")],
            ),
            entry_for(dir.path(), "platform/lang", &[("B.class", b"beta")]),
        ];
        let output = dir.path().join("out");

        unpack_all(&entries, &output).unwrap();

        assert_eq!(
            std::fs::read(output.join("core/util/com/example/A.class")).unwrap(),
            b"alpha"
        );
        assert_eq!(
            std::fs::read(output.join("platform/lang/B.class")).unwrap(),
            b"beta"
        );
    }

    #[test]
    fn test_unpack_clears_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let stale = output.join("removed/module/Old.class");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"stale generation").unwrap();

        let entries = vec![entry_for(dir.path(), "core/util", &[("A.class", b"a")])];
        unpack_all(&entries, &output).unwrap();

        assert!(!stale.exists());
        assert!(!output.join("removed").exists());
        assert!(output.join("core/util/A.class").is_file());
    }

    #[test]
    fn test_corrupt_archive_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("bad.jar");
        std::fs::write(&jar, b"this is not a zip archive").unwrap();
        let entries = vec![CacheEntry {
            logical_path: "core/util".to_string(),
            expected_hash: "0".repeat(64),
            cache_file: jar,
            state: CacheState::Present,
        }];

        let error = unpack_all(&entries, &dir.path().join("out")).unwrap_err();
        assert!(matches!(error, KilnError::Extraction { .. }));
    }

    #[test]
    fn test_empty_entry_set_still_resets_output_root() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        std::fs::create_dir_all(output.join("leftover")).unwrap();

        unpack_all(&[], &output).unwrap();

        assert!(output.is_dir());
        assert_eq!(std::fs::read_dir(&output).unwrap().count(), 0);
    }
}
