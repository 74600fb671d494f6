//! Error types for the process harness

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Process harness errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The OS refused to create the process
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A process is already tracked by this harness
    #[error("Process {pid} is still tracked; tear it down before spawning another")]
    ConcurrentProcess { pid: u32 },

    /// The process table could not be queried during teardown
    #[error("Failed to enumerate process tree of {pid}: {source}")]
    Teardown {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// Spawn was requested before a working directory was set up
    #[error("No working directory; call setup() before spawning")]
    MissingWorkDir,

    /// Working directory fixture failure
    #[error("Working directory error at {path}: {reason}")]
    WorkDir { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, ProcessError>;
