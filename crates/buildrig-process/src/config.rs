//! Harness configuration

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::sink::{LogSink, NullLogSink, StderrSink, StdoutSink};
use crate::tree::{ProcessTable, SystemProcessTable};

/// Default time allowed for the OS to report a killed child's exit
const DEFAULT_REAP_TIMEOUT_MS: u64 = 2_000;

/// Default time allowed for capture tasks to drain after the kill
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 500;

/// Configuration for a [`ProcessHarness`](crate::ProcessHarness)
#[derive(Clone)]
pub struct HarnessConfig {
    /// Mirror stdout lines to our stdout
    pub debug: bool,
    /// Tag prepended to each mirrored stdout line
    pub log_prefix: String,
    /// Mirror stderr to our stderr
    pub mirror_stderr: bool,
    /// Keep the work dir when a failed run is torn down
    pub keep_on_fail: bool,
    /// Environment applied to every spawn, beneath the caller's overlay
    pub base_env: HashMap<String, String>,
    /// Bounded wait for the killed child to be reaped
    pub reap_timeout: Duration,
    /// Bounded wait for capture tasks to hit end of stream
    pub drain_timeout: Duration,
    /// Durable destination for interleaved output
    pub log_sink: Arc<dyn LogSink>,
    /// Where tagged stdout lines are echoed in debug mode
    pub stdout_mirror: Arc<dyn LogSink>,
    /// Where stderr is echoed
    pub stderr_mirror: Arc<dyn LogSink>,
    /// Source of process-table snapshots for tree kill
    pub process_table: Arc<dyn ProcessTable>,
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self {
            debug: false,
            log_prefix: "EP: ".to_string(),
            mirror_stderr: true,
            keep_on_fail: false,
            base_env: HashMap::new(),
            reap_timeout: Duration::from_millis(DEFAULT_REAP_TIMEOUT_MS),
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
            log_sink: Arc::new(NullLogSink),
            stdout_mirror: Arc::new(StdoutSink),
            stderr_mirror: Arc::new(StderrSink),
            process_table: Arc::new(SystemProcessTable),
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_prefix = prefix.into();
        self
    }

    pub fn mirror_stderr(mut self, mirror: bool) -> Self {
        self.mirror_stderr = mirror;
        self
    }

    pub fn keep_on_fail(mut self, keep: bool) -> Self {
        self.keep_on_fail = keep;
        self
    }

    /// Add a variable to the base environment
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_env.insert(key.into(), value.into());
        self
    }

    pub fn reap_timeout(mut self, timeout: Duration) -> Self {
        self.reap_timeout = timeout;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Echo mirrored output somewhere other than our own stdout/stderr
    pub fn mirror_to(mut self, stdout: Arc<dyn LogSink>, stderr: Arc<dyn LogSink>) -> Self {
        self.stdout_mirror = stdout;
        self.stderr_mirror = stderr;
        self
    }

    pub fn process_table(mut self, table: Arc<dyn ProcessTable>) -> Self {
        self.process_table = table;
        self
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HarnessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessConfig")
            .field("debug", &self.debug)
            .field("log_prefix", &self.log_prefix)
            .field("mirror_stderr", &self.mirror_stderr)
            .field("keep_on_fail", &self.keep_on_fail)
            .field("base_env", &self.base_env)
            .field("reap_timeout", &self.reap_timeout)
            .field("drain_timeout", &self.drain_timeout)
            .finish_non_exhaustive()
    }
}

/// Options for [`ProcessHarness::teardown`](crate::ProcessHarness::teardown)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownOptions {
    /// Leave the work dir on disk
    pub preserve_workdir: bool,
}

impl TeardownOptions {
    pub fn preserve_workdir() -> Self {
        Self {
            preserve_workdir: true,
        }
    }
}
