//! Bounded HTTP client: connection reuse via a single Agent, capped
//! concurrency, atomic download-to-file.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

const REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONCURRENCY: usize = 16;
const MAX_CONCURRENCY_CAP: usize = 64;

/// Download parallelism: KILN_NETWORK_CONCURRENCY, else 2x cores, capped.
pub fn concurrency_from_env() -> usize {
    std::env::var("KILN_NETWORK_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .map(|n| n.clamp(1, MAX_CONCURRENCY_CAP))
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| (n.get() * 2).clamp(4, MAX_CONCURRENCY_CAP))
                .unwrap_or(DEFAULT_CONCURRENCY)
        })
}

fn timeout_ms_from_env() -> u64 {
    std::env::var("KILN_HTTP_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(REQUEST_TIMEOUT_MS)
}

/// Semaphore-style limit: wait until a slot is free, then hold until the
/// guard is dropped.
struct ConcurrencyLimit {
    mutex: Mutex<usize>,
    condvar: Condvar,
    max: usize,
}

impl ConcurrencyLimit {
    fn new(max: usize) -> Self {
        Self {
            mutex: Mutex::new(0),
            condvar: Condvar::new(),
            max,
        }
    }

    fn acquire(&self) -> ConcurrencyGuard<'_> {
        let mut guard = self.mutex.lock().unwrap();
        while *guard >= self.max {
            guard = self.condvar.wait(guard).unwrap();
        }
        *guard += 1;
        ConcurrencyGuard(self)
    }
}

struct ConcurrencyGuard<'a>(&'a ConcurrencyLimit);

impl Drop for ConcurrencyGuard<'_> {
    fn drop(&mut self) {
        let mut guard = self.0.mutex.lock().unwrap();
        *guard = guard.saturating_sub(1);
        self.0.condvar.notify_one();
    }
}

/// HTTP client: one Agent (connection reuse), bounded concurrent requests.
pub struct HttpClient {
    agent: ureq::Agent,
    limit: ConcurrencyLimit,
}

impl HttpClient {
    pub fn new(max_concurrent: usize) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(timeout_ms_from_env()))
            .build();
        Self {
            agent,
            limit: ConcurrencyLimit::new(max_concurrent.max(1)),
        }
    }

    /// GET `url` and stream the body into `dest`, writing a `.tmp` sibling
    /// first and renaming on success so a killed download never leaves a
    /// half-written file under the final name. Returns bytes written.
    pub fn download(&self, url: &str, dest: &Path) -> Result<u64, String> {
        let _slot = self.limit.acquire();
        let response = self.agent.get(url).call().map_err(|e| e.to_string())?;

        let tmp = dest.with_extension("tmp");
        let mut out = File::create(&tmp)
            .map_err(|e| format!("cannot create {}: {}", tmp.display(), e))?;
        let mut body = response.into_reader();
        let written = match io::copy(&mut body, &mut out) {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(format!("body read failed: {}", e));
            }
        };
        if let Err(e) = out.sync_all() {
            let _ = fs::remove_file(&tmp);
            return Err(format!("sync failed: {}", e));
        }
        drop(out);
        fs::rename(&tmp, dest).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            format!("cannot finalize {}: {}", dest.display(), e)
        })?;
        Ok(written)
    }
}
