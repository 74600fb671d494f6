//! # buildrig-process
//!
//! **Purpose**: Supervise build-tool and dev-server processes in tests
//!
//! Spawns one process at a time inside a private work dir, captures its
//! output, and tears down the whole process tree when the run is over.
//!
//! ## Features
//!
//! - **Spawning**: async spawn with an environment overlay on top of the ambient one
//! - **Output Capture**: unbounded stdout/stderr buffers plus a durable [`LogSink`]
//! - **Debug Mirroring**: stdout lines echoed with a provenance prefix, stderr echoed as is
//! - **Tree Kill**: SIGKILL for the process and every descendant found in the process table
//! - **Work Dirs**: temp dirs populated from nested JSON fixture trees
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use buildrig_process::{HarnessConfig, ProcessHarness, TeardownOptions};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut harness = ProcessHarness::new(HarnessConfig::new().debug(true));
//! harness.setup(&json!({ "index.js": "require('http').createServer().listen(6666)" }))?;
//!
//! let server = harness.spawn("node", ["index.js"], HashMap::new()).await?;
//! println!("server pid {}", server.pid());
//!
//! // Kill the server and everything it started, remove the work dir
//! let transcript = harness.teardown(TeardownOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

mod capture;
pub mod config;
pub mod error;
pub mod handle;
pub mod harness;
pub mod sink;
pub mod transcript;
pub mod tree;
pub mod workdir;

pub use capture::tag_lines;
pub use config::{HarnessConfig, TeardownOptions};
pub use error::{ProcessError, Result};
pub use handle::{ExitOutcome, ProcessHandle, ProcessState, Stream};
pub use harness::ProcessHarness;
pub use sink::{FileLogSink, LogSink, MemoryLogSink, NullLogSink, StderrSink, StdoutSink};
pub use transcript::Transcript;
pub use tree::{descendants, ProcessEntry, ProcessTable, SystemProcessTable};
#[cfg(target_os = "linux")]
pub use tree::ProcfsProcessTable;
pub use workdir::{flatten_tree, WorkDir};
