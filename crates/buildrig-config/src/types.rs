//! Settings types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    /// Process harness settings
    pub harness: HarnessSettings,
    /// Default poll loop bounds
    pub poll: PollSettings,
}

/// Process harness settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessSettings {
    /// Mirror child stdout with a prefix
    pub debug: bool,
    /// Keep the work dir when a run fails
    pub keep_on_fail: bool,
    /// Mirror child stderr
    pub mirror_stderr: bool,
    /// Prefix for mirrored stdout lines
    pub log_prefix: String,
    /// Durable output log, relative paths resolve against the work dir
    pub log_file: Option<PathBuf>,
    /// How long to wait for a killed child to be reaped
    pub reap_timeout_ms: u64,
}

/// Default poll loop bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollSettings {
    pub backoff_ms: u64,
    pub max_attempts: Option<u32>,
    pub timeout_ms: Option<u64>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            debug: false,
            keep_on_fail: false,
            mirror_stderr: true,
            log_prefix: "EP: ".to_string(),
            log_file: Some(PathBuf::from("target/server.log")),
            reap_timeout_ms: 2_000,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            backoff_ms: 100,
            max_attempts: None,
            timeout_ms: Some(30_000),
        }
    }
}
