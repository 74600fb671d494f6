//! Captured output of a finished run

use std::fmt::Write;

use serde::Serialize;

use crate::handle::{ExitOutcome, ProcessHandle};

/// What a run printed, captured at teardown before buffers are cleared
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub pid: u32,
    pub command: String,
    pub args: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit: Option<ExitOutcome>,
}

impl Transcript {
    pub(crate) fn capture(handle: &ProcessHandle) -> Self {
        Self {
            pid: handle.pid(),
            command: handle.command().to_string(),
            args: handle.args().to_vec(),
            stdout: handle.stdout_text(),
            stderr: handle.stderr_text(),
            exit: handle.exit(),
        }
    }

    /// Sectioned dump of both streams, for printing when a run fails
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, text) in [("stdout", &self.stdout), ("stderr", &self.stderr)] {
            let rule = format!("---------------{}---------------", name);
            let _ = writeln!(out, "{}", rule);
            let _ = writeln!(out, "{}", text.trim());
            let _ = writeln!(out, "{}", rule);
        }
        out
    }
}
