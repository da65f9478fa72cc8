//! On-disk cache of compile-part archives, keyed by logical path plus
//! content hash: `{cacheRoot}/{logicalPath}/{hash}.jar`.
//!
//! Identity and integrity check are the same operation: a file whose name
//! says `{hash}.jar` must hash to exactly that value or it is garbage.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::KilnError;
use crate::manifest::{ManifestEntry, ARCHIVE_EXTENSION};
use crate::verify;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    Absent,
    Present,
    Corrupt,
}

/// One manifest entry resolved against the local cache.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub logical_path: String,
    pub expected_hash: String,
    pub cache_file: PathBuf,
    pub state: CacheState,
}

/// What the opportunistic repair pass found for an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepairAction {
    /// File present with the expected hash
    Intact,
    /// File present with a different hash; deleted, entry left Absent
    Deleted,
    /// No file on disk
    Missing,
}

/// Local cache store. Filesystem only; never touches the network.
pub struct CacheStore {
    root: PathBuf,
    persistent: bool,
}

impl CacheStore {
    /// `persistent` marks the root as externally owned and retained; kiln
    /// then skips its own retention cleanup.
    pub fn new(root: PathBuf, persistent: bool) -> Self {
        Self { root, persistent }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Compute the entry's cache file path and make sure its directory
    /// exists. Ephemeral caches also drop stale siblings here so per-build
    /// working areas stay bounded.
    pub fn resolve(&self, part: &ManifestEntry) -> Result<CacheEntry, KilnError> {
        let dir = self.root.join(&part.logical_path);
        fs::create_dir_all(&dir)
            .map_err(|e| KilnError::cache_io("create cache directory", &dir, e))?;
        if !self.persistent {
            self.prune_stale_siblings(&dir, &part.hash);
        }
        Ok(CacheEntry {
            logical_path: part.logical_path.clone(),
            expected_hash: part.hash.clone(),
            cache_file: dir.join(format!("{}.{}", part.hash, ARCHIVE_EXTENSION)),
            state: CacheState::Absent,
        })
    }

    /// Opportunistic repair: re-hash an existing file, keep it on a match,
    /// delete it on a mismatch. Corrective, not a retry loop; an entry is
    /// repaired at most once per run.
    pub fn repair(&self, entry: &mut CacheEntry) -> Result<RepairAction, KilnError> {
        if !entry.cache_file.is_file() {
            entry.state = CacheState::Absent;
            return Ok(RepairAction::Missing);
        }
        let actual = verify::hash_file(&entry.cache_file)
            .map_err(|e| KilnError::cache_io("hash cache file", &entry.cache_file, e))?;
        if actual == entry.expected_hash {
            entry.state = CacheState::Present;
            return Ok(RepairAction::Intact);
        }
        entry.state = CacheState::Corrupt;
        fs::remove_file(&entry.cache_file)
            .map_err(|e| KilnError::cache_io("delete corrupt cache file", &entry.cache_file, e))?;
        entry.state = CacheState::Absent;
        Ok(RepairAction::Deleted)
    }

    /// Delete archives under this logical path whose stem is not the current
    /// expected hash. Retention for persistent roots is delegated to the
    /// external cache owner.
    fn prune_stale_siblings(&self, dir: &Path, keep_hash: &str) {
        let Ok(read) = fs::read_dir(dir) else { return };
        for sibling in read.flatten() {
            let path = sibling.path();
            if !path.is_file()
                || path.extension().and_then(|s| s.to_str()) != Some(ARCHIVE_EXTENSION)
            {
                continue;
            }
            let stale = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|stem| stem != keep_hash)
                .unwrap_or(true);
            if stale {
                let _ = fs::remove_file(&path);
            }
        }
    }
}
