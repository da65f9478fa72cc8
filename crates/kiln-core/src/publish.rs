//! Early-publish guard: per-artifact decision under a heuristic disk-space
//! budget.
//!
//! The guard shares exactly one thing with the rest of the build, the
//! running produced-bytes total. It never fails the build; it only
//! suppresses the early-publish side channel. Final artifact collection at
//! end of build is unaffected.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const GIB: u64 = 1024 * 1024 * 1024;

/// Files at or below this size are published without a space check.
pub const DEFAULT_SIZE_THRESHOLD_BYTES: u64 = 1_000_000;
/// Budget for artifacts already handed to early publication.
pub const DEFAULT_MAX_TOLERATED_BYTES: u64 = 9 * GIB;
/// Space kept free for the remainder of the build.
pub const DEFAULT_HEADROOM_BYTES: u64 = 6 * GIB;

#[derive(Clone, Copy, Debug)]
pub struct PublishConfig {
    pub size_threshold: u64,
    pub max_tolerated: u64,
    pub headroom: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD_BYTES,
            max_tolerated: DEFAULT_MAX_TOLERATED_BYTES,
            headroom: DEFAULT_HEADROOM_BYTES,
        }
    }
}

impl PublishConfig {
    /// Defaults with KILN_PUBLISH_* env overrides.
    pub fn from_env() -> Self {
        Self {
            size_threshold: env_u64("KILN_PUBLISH_THRESHOLD_BYTES", DEFAULT_SIZE_THRESHOLD_BYTES),
            max_tolerated: env_u64("KILN_PUBLISH_MAX_TOLERATED_BYTES", DEFAULT_MAX_TOLERATED_BYTES),
            headroom: env_u64("KILN_PUBLISH_HEADROOM_BYTES", DEFAULT_HEADROOM_BYTES),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Process-wide running total of produced artifact bytes. Monotonic for the
/// lifetime of the build process; never reset mid-run.
#[derive(Debug, Default)]
pub struct PublishSession {
    produced_bytes: AtomicU64,
}

impl PublishSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the counter, for one-shot decisions outside a full build.
    pub fn with_produced(bytes: u64) -> Self {
        Self {
            produced_bytes: AtomicU64::new(bytes),
        }
    }

    pub fn produced_bytes(&self) -> u64 {
        self.produced_bytes.load(Ordering::SeqCst)
    }

    /// Atomic add-and-return; returns the total before this addition.
    fn record(&self, bytes: u64) -> u64 {
        self.produced_bytes.fetch_add(bytes, Ordering::SeqCst)
    }
}

/// Receives early-publish notification strings.
pub trait PublishNotifier {
    fn notify(&self, message: &str);
}

/// Where free-space numbers come from; swapped out in tests.
pub trait SpaceProbe: Send + Sync {
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

/// Free space on the volume holding `path`.
pub struct DiskSpace;

impl SpaceProbe for DiskSpace {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        fs2::available_space(path).ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishDecision {
    Published,
    /// Early publication suppressed for this artifact.
    Skipped,
}

/// Per-artifact early-publish decision, invoked once per artifact the build
/// produces.
pub struct PublishGuard {
    artifacts_root: PathBuf,
    config: PublishConfig,
    probe: Box<dyn SpaceProbe>,
}

impl PublishGuard {
    pub fn new(artifacts_root: PathBuf, config: PublishConfig) -> Self {
        Self {
            artifacts_root,
            config,
            probe: Box::new(DiskSpace),
        }
    }

    pub fn with_space_probe(mut self, probe: Box<dyn SpaceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Offer one produced artifact for early publication. Probe and metadata
    /// errors degrade to publishing; the guard is advisory only.
    pub fn offer(
        &self,
        session: &PublishSession,
        artifact: &Path,
        notifier: &dyn PublishNotifier,
    ) -> PublishDecision {
        let metadata = fs::metadata(artifact).ok();
        let is_dir = metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false);
        let file_len = metadata.as_ref().filter(|m| m.is_file()).map(|m| m.len());

        if let Some(len) = file_len {
            if len > self.config.size_threshold {
                // The running total grows whenever the size check fires,
                // even when publication ends up skipped and even for files
                // outside the artifacts root. Known over-count; callers
                // depend on the totals staying comparable across builds.
                let produced = session.record(len);
                let reserved = self.config.max_tolerated as i128 - produced as i128
                    + self.config.headroom as i128
                    + len as i128;
                let will_publish_now = artifact.starts_with(&self.artifacts_root);
                if will_publish_now {
                    if let Some(available) = self.probe.available_bytes(artifact) {
                        if (available as i128) < reserved {
                            return PublishDecision::Skipped;
                        }
                    }
                }
            }
        }

        notifier.notify(&self.notification(artifact, is_dir));
        PublishDecision::Published
    }

    /// `"<abs>"` plain, or `"<abs>=><relative target dir>"` when the
    /// artifact's parent is under the artifacts root. Directories append
    /// their own name to the relative path.
    fn notification(&self, artifact: &Path, is_dir: bool) -> String {
        let relative = artifact
            .parent()
            .and_then(|parent| parent.strip_prefix(&self.artifacts_root).ok())
            .map(|rel| {
                if is_dir {
                    match artifact.file_name() {
                        Some(name) => rel.join(name),
                        None => rel.to_path_buf(),
                    }
                } else {
                    rel.to_path_buf()
                }
            });
        match relative {
            Some(rel) => format!("{}=>{}", artifact.display(), rel.display()),
            None => artifact.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedSpace(u64);

    impl SpaceProbe for FixedSpace {
        fn available_bytes(&self, _path: &Path) -> Option<u64> {
            Some(self.0)
        }
    }

    struct Collector(Mutex<Vec<String>>);

    impl Collector {
        fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }

        fn messages(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl PublishNotifier for Collector {
        fn notify(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn big_artifact(root: &Path, len: usize) -> PathBuf {
        let path = root.join("dist").join("app.jar");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, vec![0u8; len]).unwrap();
        path
    }

    #[test]
    fn test_large_artifact_publishes_when_space_is_ample() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = big_artifact(dir.path(), 2_000_000);
        let guard = PublishGuard::new(dir.path().to_path_buf(), PublishConfig::default())
            .with_space_probe(Box::new(FixedSpace(20 * GIB)));
        let session = PublishSession::new();
        let collector = Collector::new();

        let decision = guard.offer(&session, &artifact, &collector);

        assert_eq!(decision, PublishDecision::Published);
        assert_eq!(session.produced_bytes(), 2_000_000);
        assert_eq!(
            collector.messages(),
            vec![format!("{}=>dist", artifact.display())]
        );
    }

    #[test]
    fn test_large_artifact_skips_when_space_is_tight_but_still_counts() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = big_artifact(dir.path(), 2_000_000);
        // reserved is roughly 15 GiB here, so 10 GiB available must skip
        let guard = PublishGuard::new(dir.path().to_path_buf(), PublishConfig::default())
            .with_space_probe(Box::new(FixedSpace(10 * GIB)));
        let session = PublishSession::new();
        let collector = Collector::new();

        let decision = guard.offer(&session, &artifact, &collector);

        assert_eq!(decision, PublishDecision::Skipped);
        assert_eq!(session.produced_bytes(), 2_000_000);
        assert!(collector.messages().is_empty());
    }

    #[test]
    fn test_small_artifact_publishes_without_counting() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = big_artifact(dir.path(), 512);
        let guard = PublishGuard::new(dir.path().to_path_buf(), PublishConfig::default())
            .with_space_probe(Box::new(FixedSpace(0)));
        let session = PublishSession::new();
        let collector = Collector::new();

        assert_eq!(
            guard.offer(&session, &artifact, &collector),
            PublishDecision::Published
        );
        assert_eq!(session.produced_bytes(), 0);
        assert_eq!(collector.messages().len(), 1);
    }

    #[test]
    fn test_large_artifact_outside_root_counts_but_never_skips() {
        let artifacts = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let artifact = big_artifact(elsewhere.path(), 2_000_000);
        let guard = PublishGuard::new(artifacts.path().to_path_buf(), PublishConfig::default())
            .with_space_probe(Box::new(FixedSpace(0)));
        let session = PublishSession::new();
        let collector = Collector::new();

        let decision = guard.offer(&session, &artifact, &collector);

        assert_eq!(decision, PublishDecision::Published);
        assert_eq!(session.produced_bytes(), 2_000_000);
        // outside the artifacts root the message has no relative part
        assert_eq!(collector.messages(), vec![artifact.display().to_string()]);
    }

    #[test]
    fn test_directory_artifact_appends_its_own_name() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("dist").join("bundle");
        std::fs::create_dir_all(&bundle).unwrap();
        let guard = PublishGuard::new(dir.path().to_path_buf(), PublishConfig::default());
        let session = PublishSession::new();
        let collector = Collector::new();

        guard.offer(&session, &bundle, &collector);

        assert_eq!(
            collector.messages(),
            vec![format!("{}=>{}", bundle.display(), Path::new("dist").join("bundle").display())]
        );
        assert_eq!(session.produced_bytes(), 0);
    }

    #[test]
    fn test_negative_reserve_never_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = big_artifact(dir.path(), 2_000_000);
        let guard = PublishGuard::new(dir.path().to_path_buf(), PublishConfig::default())
            .with_space_probe(Box::new(FixedSpace(1)));
        // produced far beyond the tolerated band drives reserved below zero
        let session = PublishSession::with_produced(40 * GIB);
        let collector = Collector::new();

        assert_eq!(
            guard.offer(&session, &artifact, &collector),
            PublishDecision::Published
        );
    }
}
