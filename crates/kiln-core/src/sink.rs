//! Message and statistics sink supplied by the caller: leveled messages,
//! scoped blocks, and numeric statistic reporting.

use std::sync::Mutex;
use std::time::Instant;

use chrono::Local;

/// Capability interface the pipeline reports through. The caller owns the
/// implementation; the pipeline never writes to stdout directly.
pub trait BuildSink: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    /// Fatal-condition message. Emitting it does not itself abort anything;
    /// the error value propagating out of the stage does.
    fn error(&self, message: &str);
    fn scope_started(&self, name: &str);
    fn scope_finished(&self, name: &str, elapsed_ms: u64);
    /// Numeric statistic: times in milliseconds, everything else raw counts/bytes.
    fn report_statistic(&self, key: &str, value: i64);
}

/// Run `body` inside a named scope, reporting wall time to the sink.
pub fn with_scope<T>(sink: &dyn BuildSink, name: &str, body: impl FnOnce() -> T) -> T {
    sink.scope_started(name);
    let started = Instant::now();
    let out = body();
    sink.scope_finished(name, started.elapsed().as_millis() as u64);
    out
}

/// Timestamped console sink. KILN_QUIET=1 silences info and scopes;
/// debug lines additionally need KILN_LOG=debug. Warnings and errors
/// always go to stderr.
pub struct ConsoleSink {
    quiet: bool,
    verbose: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        let quiet = std::env::var("KILN_QUIET")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);
        let verbose = std::env::var("KILN_LOG")
            .map(|v| v.to_lowercase() == "debug")
            .unwrap_or(false);
        Self { quiet, verbose }
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn stamp(message: &str) -> String {
        format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message)
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildSink for ConsoleSink {
    fn debug(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("{}", Self::stamp(message));
        }
    }

    fn info(&self, message: &str) {
        if !self.quiet {
            println!("{}", Self::stamp(message));
        }
    }

    fn warning(&self, message: &str) {
        eprintln!("{}", Self::stamp(&format!("WARNING: {}", message)));
    }

    fn error(&self, message: &str) {
        eprintln!("{}", Self::stamp(&format!("ERROR: {}", message)));
    }

    fn scope_started(&self, name: &str) {
        if !self.quiet {
            println!("{}", Self::stamp(&format!("{} …", name)));
        }
    }

    fn scope_finished(&self, name: &str, elapsed_ms: u64) {
        self.debug(&format!("{} finished in {}ms", name, elapsed_ms));
    }

    fn report_statistic(&self, key: &str, value: i64) {
        self.debug(&format!("{} = {}", key, value));
    }
}

/// Sink that records everything it receives. Test double for pipeline
/// assertions; also usable by embedders that aggregate messages themselves.
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<(String, String)>>,
    pub scopes: Mutex<Vec<String>>,
    pub statistics: Mutex<Vec<(String, i64)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, level: &str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((level.to_string(), message.to_string()));
    }

    /// Last reported value for a statistic key, if any.
    pub fn statistic(&self, key: &str) -> Option<i64> {
        self.statistics
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    pub fn has_message(&self, level: &str, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|(l, m)| l == level && m.contains(needle))
    }
}

impl BuildSink for RecordingSink {
    fn debug(&self, message: &str) {
        self.record("debug", message);
    }

    fn info(&self, message: &str) {
        self.record("info", message);
    }

    fn warning(&self, message: &str) {
        self.record("warning", message);
    }

    fn error(&self, message: &str) {
        self.record("error", message);
    }

    fn scope_started(&self, name: &str) {
        self.scopes.lock().unwrap().push(name.to_string());
    }

    fn scope_finished(&self, _name: &str, _elapsed_ms: u64) {}

    fn report_statistic(&self, key: &str, value: i64) {
        self.statistics
            .lock()
            .unwrap()
            .push((key.to_string(), value));
    }
}
