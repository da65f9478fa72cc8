//! Core library for Kiln: manifest, cache store, fetch scheduler, integrity
//! verification, unpack stage, and the early-publish guard.
//! Used by the CLI binary; can be reused by a surrounding build orchestrator.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod manifest;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod session;
pub mod sink;
pub mod stats;
pub mod unpack;
pub mod verify;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export main API for the CLI
pub use cache::{CacheEntry, CacheState, CacheStore, RepairAction};
pub use config::{build_cache_root, persistent_cache_root, KilnConfig};
pub use error::KilnError;
pub use http::HttpClient;
pub use manifest::{ManifestEntry, PartsManifest};
pub use model::{ProjectModel, StaticProjectModel, TaskRunner};
pub use pipeline::{check, materialize, CheckSummary};
pub use publish::{
    PublishConfig, PublishDecision, PublishGuard, PublishNotifier, PublishSession,
};
pub use session::BuildSession;
pub use sink::{with_scope, BuildSink, ConsoleSink, RecordingSink};
pub use stats::StatsSnapshot;
pub use verify::{hash_file, HashMismatch};
