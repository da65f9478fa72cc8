//! Per-invocation build session: the publish running total and the one-shot
//! dependency-setup latch, threaded explicitly instead of hidden statics.

use std::sync::Mutex;

use crate::model::TaskRunner;
use crate::publish::PublishSession;

/// Constructed once per build invocation and passed down; owns the state
/// that must outlive individual pipeline stages.
pub struct BuildSession {
    publish: PublishSession,
    dependencies_ready: Mutex<bool>,
}

impl BuildSession {
    pub fn new() -> Self {
        Self {
            publish: PublishSession::new(),
            dependencies_ready: Mutex::new(false),
        }
    }

    pub fn publish(&self) -> &PublishSession {
        &self.publish
    }

    /// Run the named setup task at most once per session. A failed attempt
    /// propagates its error and leaves the latch unset, so the next caller
    /// retries.
    pub fn ensure_dependencies(&self, runner: &dyn TaskRunner, task: &str) -> Result<(), String> {
        let mut ready = self.dependencies_ready.lock().unwrap();
        if *ready {
            return Ok(());
        }
        runner.run_task(task)?;
        *ready = true;
        Ok(())
    }
}

impl Default for BuildSession {
    fn default() -> Self {
        Self::new()
    }
}
