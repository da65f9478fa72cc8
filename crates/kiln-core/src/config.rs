//! Build-side configuration: cache location, persistence directive, and
//! tuning knobs. Env overrides first, then defaults.

use std::env;
use std::path::{Path, PathBuf};

use crate::http;
use crate::publish::PublishConfig;

const CACHE_DIR_NAME: &str = ".kiln-cache";

/// Ephemeral cache under the build's working area. KILN_CACHE_DIR overrides.
pub fn build_cache_root(working_dir: &Path) -> PathBuf {
    if let Ok(dir) = env::var("KILN_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    working_dir.join(CACHE_DIR_NAME)
}

/// Shared persistent cache under the user's home directory.
/// KILN_CACHE_DIR overrides; falls back to the working directory when no
/// home is known.
pub fn persistent_cache_root() -> PathBuf {
    if let Ok(dir) = env::var("KILN_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(CACHE_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(CACHE_DIR_NAME))
}

#[derive(Clone, Debug)]
pub struct KilnConfig {
    pub cache_root: PathBuf,
    /// The cache directory is owned and retained by an external system;
    /// kiln skips its own retention cleanup when set.
    pub persistent_cache: bool,
    pub output_root: PathBuf,
    pub network_concurrency: usize,
    pub publish: PublishConfig,
}

impl KilnConfig {
    /// Resolve a runnable configuration from explicit values plus env.
    /// An explicit cache dir wins; otherwise the persistent flag picks
    /// between the home-dir cache and a per-build working-area cache.
    pub fn resolve(
        cache_dir: Option<PathBuf>,
        persistent_cache: bool,
        output_root: PathBuf,
    ) -> Self {
        let cache_root = cache_dir.unwrap_or_else(|| {
            if persistent_cache {
                persistent_cache_root()
            } else {
                build_cache_root(Path::new("."))
            }
        });
        Self {
            cache_root,
            persistent_cache,
            output_root,
            network_concurrency: http::concurrency_from_env(),
            publish: PublishConfig::from_env(),
        }
    }
}
