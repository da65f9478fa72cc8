//! Concurrency-safe pipeline counters and the statistic keys reported to
//! the build's statistics sink.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::sink::BuildSink;

pub const STAT_DOWNLOAD_TIME: &str = "compile-parts:download:time";
pub const STAT_TOTAL_BYTES: &str = "compile-parts:total:bytes";
pub const STAT_TOTAL_COUNT: &str = "compile-parts:total:count";
pub const STAT_DOWNLOADED_BYTES: &str = "compile-parts:downloaded:bytes";
pub const STAT_DOWNLOADED_COUNT: &str = "compile-parts:downloaded:count";
pub const STAT_REUSED_BYTES: &str = "compile-parts:reused:bytes";
pub const STAT_REUSED_COUNT: &str = "compile-parts:reused:count";
pub const STAT_VERIFY_TIME: &str = "compile-parts:verify:time";
pub const STAT_UNPACK_TIME: &str = "compile-parts:unpack:time";

/// Counters for one pipeline run. Safe under concurrent writers; read via
/// `snapshot` after the stage join points.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub total_bytes: AtomicU64,
    pub total_count: AtomicU64,
    pub downloaded_bytes: AtomicU64,
    pub downloaded_count: AtomicU64,
    pub reused_bytes: AtomicU64,
    pub reused_count: AtomicU64,
    pub download_ms: AtomicU64,
    pub verify_ms: AtomicU64,
    pub unpack_ms: AtomicU64,
}

/// Plain-value copy of the counters, for callers and `--json` output.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StatsSnapshot {
    pub total_bytes: u64,
    pub total_count: u64,
    pub downloaded_bytes: u64,
    pub downloaded_count: u64,
    pub reused_bytes: u64,
    pub reused_count: u64,
    pub download_ms: u64,
    pub verify_ms: u64,
    pub unpack_ms: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            total_count: self.total_count.load(Ordering::Relaxed),
            downloaded_bytes: self.downloaded_bytes.load(Ordering::Relaxed),
            downloaded_count: self.downloaded_count.load(Ordering::Relaxed),
            reused_bytes: self.reused_bytes.load(Ordering::Relaxed),
            reused_count: self.reused_count.load(Ordering::Relaxed),
            download_ms: self.download_ms.load(Ordering::Relaxed),
            verify_ms: self.verify_ms.load(Ordering::Relaxed),
            unpack_ms: self.unpack_ms.load(Ordering::Relaxed),
        }
    }

    /// Report every statistic once, at the end of a run. Times are
    /// milliseconds, everything else raw counts and bytes.
    pub fn report(&self, sink: &dyn BuildSink) {
        let snap = self.snapshot();
        sink.report_statistic(STAT_DOWNLOAD_TIME, snap.download_ms as i64);
        sink.report_statistic(STAT_TOTAL_BYTES, snap.total_bytes as i64);
        sink.report_statistic(STAT_TOTAL_COUNT, snap.total_count as i64);
        sink.report_statistic(STAT_DOWNLOADED_BYTES, snap.downloaded_bytes as i64);
        sink.report_statistic(STAT_DOWNLOADED_COUNT, snap.downloaded_count as i64);
        sink.report_statistic(STAT_REUSED_BYTES, snap.reused_bytes as i64);
        sink.report_statistic(STAT_REUSED_COUNT, snap.reused_count as i64);
        sink.report_statistic(STAT_VERIFY_TIME, snap.verify_ms as i64);
        sink.report_statistic(STAT_UNPACK_TIME, snap.unpack_ms as i64);
    }
}
