//! End-to-end materialization: repair pass, fetch, full verification
//! barrier, then all-or-nothing unpack.
//!
//! The verifier's join is the synchronization barrier: unpack starts only
//! after every entry has reported and the aggregated mismatch set is
//! complete. Any fatal condition terminates the run synchronously.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::cache::{CacheEntry, CacheState, CacheStore, RepairAction};
use crate::error::KilnError;
use crate::fetch;
use crate::http::HttpClient;
use crate::manifest::PartsManifest;
use crate::sink::{with_scope, BuildSink};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::unpack;
use crate::verify;

/// Run the full pipeline for one manifest and report statistics to the
/// sink. Returns the counter snapshot for the run.
pub fn materialize(
    manifest: &PartsManifest,
    store: &CacheStore,
    client: &HttpClient,
    output_root: &Path,
    sink: &dyn BuildSink,
) -> Result<StatsSnapshot, KilnError> {
    let stats = PipelineStats::default();

    let mut entries = with_scope(sink, "repair compile-parts cache", || {
        repair_pass(manifest, store, sink)
    })?
    .entries;

    with_scope(sink, "fetch compile parts", || {
        let started = Instant::now();
        let result = fetch::fetch_missing(manifest, &mut entries, client, &stats);
        stats
            .download_ms
            .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        result
    })?;

    with_scope(sink, "verify compile parts", || {
        let started = Instant::now();
        let mismatches = verify::verify_entries(&entries);
        stats
            .verify_ms
            .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        let mismatches = mismatches?;
        if mismatches.is_empty() {
            Ok(())
        } else {
            let error = KilnError::Integrity { mismatches };
            sink.error(&error.to_string());
            Err(error)
        }
    })?;

    with_scope(sink, "unpack compile parts", || {
        let started = Instant::now();
        let result = unpack::unpack_all(&entries, output_root);
        stats
            .unpack_ms
            .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        result
    })?;

    stats.report(sink);
    Ok(stats.snapshot())
}

/// Result of a repair-pass-only check: no network, no unpack.
#[derive(Clone, Debug, Default)]
pub struct CheckSummary {
    pub intact: usize,
    pub repaired: usize,
    /// Logical paths without a valid cache file after the pass.
    pub missing: Vec<String>,
}

impl CheckSummary {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Resolve and repair every entry, reporting what a full run would still
/// have to fetch.
pub fn check(
    manifest: &PartsManifest,
    store: &CacheStore,
    sink: &dyn BuildSink,
) -> Result<CheckSummary, KilnError> {
    let pass = with_scope(sink, "repair compile-parts cache", || {
        repair_pass(manifest, store, sink)
    })?;

    let mut summary = CheckSummary {
        intact: pass.intact,
        repaired: pass.deleted,
        missing: Vec::new(),
    };
    for entry in &pass.entries {
        if entry.state != CacheState::Present {
            summary.missing.push(entry.logical_path.clone());
        }
    }
    Ok(summary)
}

struct RepairPass {
    entries: Vec<CacheEntry>,
    intact: usize,
    deleted: usize,
}

fn repair_pass(
    manifest: &PartsManifest,
    store: &CacheStore,
    sink: &dyn BuildSink,
) -> Result<RepairPass, KilnError> {
    let mut entries = Vec::with_capacity(manifest.len());
    let mut intact = 0usize;
    let mut deleted = 0usize;
    for part in manifest.entries() {
        let mut entry = store.resolve(part)?;
        match store.repair(&mut entry)? {
            RepairAction::Intact => intact += 1,
            RepairAction::Deleted => {
                deleted += 1;
                sink.warning(&format!("stale cache file deleted for {}", entry.logical_path));
            }
            RepairAction::Missing => {}
        }
        entries.push(entry);
    }
    sink.info(&format!(
        "{} of {} compile parts already cached ({} stale deleted)",
        intact,
        entries.len(),
        deleted
    ));
    Ok(RepairPass {
        entries,
        intact,
        deleted,
    })
}
