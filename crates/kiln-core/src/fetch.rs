//! Fetch scheduler: downloads the entries the repair pass left Absent.
//!
//! Entries are mutually independent (disjoint destination files), so
//! downloads run concurrently with no ordering between them. Any single
//! failure is a hard error that aborts the whole stage; retry policy belongs
//! to the invoking build orchestrator.

use std::fs;
use std::sync::atomic::Ordering;

use rayon::prelude::*;

use crate::cache::{CacheEntry, CacheState};
use crate::error::KilnError;
use crate::http::HttpClient;
use crate::manifest::PartsManifest;
use crate::stats::PipelineStats;

/// Download every `Absent` entry into its cache file and aggregate byte and
/// count statistics for the stage. Entries already `Present` are counted as
/// reused, measured by file size after the stage.
pub fn fetch_missing(
    manifest: &PartsManifest,
    entries: &mut [CacheEntry],
    client: &HttpClient,
    stats: &PipelineStats,
) -> Result<(), KilnError> {
    let present_before: Vec<bool> = entries
        .iter()
        .map(|entry| entry.state == CacheState::Present)
        .collect();

    entries
        .par_iter_mut()
        .filter(|entry| entry.state == CacheState::Absent)
        .try_for_each(|entry| {
            let url = manifest.entry_url(&entry.logical_path, &entry.expected_hash);
            let written = client
                .download(&url, &entry.cache_file)
                .map_err(|source| KilnError::Network {
                    logical_path: entry.logical_path.clone(),
                    url: url.clone(),
                    source,
                })?;
            entry.state = CacheState::Present;
            stats.downloaded_bytes.fetch_add(written, Ordering::Relaxed);
            stats.downloaded_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })?;

    for (entry, was_present) in entries.iter().zip(present_before) {
        let len = fs::metadata(&entry.cache_file)
            .map(|m| m.len())
            .map_err(|e| KilnError::cache_io("stat cache file", &entry.cache_file, e))?;
        stats.total_bytes.fetch_add(len, Ordering::Relaxed);
        stats.total_count.fetch_add(1, Ordering::Relaxed);
        if was_present {
            stats.reused_bytes.fetch_add(len, Ordering::Relaxed);
            stats.reused_count.fetch_add(1, Ordering::Relaxed);
        }
    }
    Ok(())
}
