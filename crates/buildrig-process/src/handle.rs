//! Live view of a supervised process

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle of a handle as seen by the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
    Spawning,
    Running,
    Terminating,
    Terminated,
}

impl ProcessState {
    /// Whether a harness in this state still owns a process
    pub fn is_live(self) -> bool {
        matches!(self, ProcessState::Running | ProcessState::Terminating)
    }
}

/// How the process left the OS process table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExitOutcome {
    /// Exit code, if it exited normally
    pub code: Option<i32>,
    /// Terminating signal, if it was killed (Unix only)
    pub signal: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown exit"),
        }
    }
}

/// Which output stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

struct Shared {
    pid: u32,
    command: String,
    args: Vec<String>,
    environment: HashMap<String, String>,
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
    state: Mutex<ProcessState>,
    exit: watch::Sender<Option<ExitOutcome>>,
}

/// Read-only handle to a process spawned by a [`ProcessHarness`](crate::ProcessHarness)
///
/// Clones share the same state. Buffers only grow while the process lives;
/// the capture tasks are their sole writers.
#[derive(Clone)]
pub struct ProcessHandle {
    shared: Arc<Shared>,
}

impl ProcessHandle {
    pub(crate) fn new(
        pid: u32,
        command: String,
        args: Vec<String>,
        environment: HashMap<String, String>,
    ) -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                pid,
                command,
                args,
                environment,
                stdout: Mutex::new(Vec::new()),
                stderr: Mutex::new(Vec::new()),
                state: Mutex::new(ProcessState::Spawning),
                exit,
            }),
        }
    }

    /// OS process ID
    pub fn pid(&self) -> u32 {
        self.shared.pid
    }

    pub fn command(&self) -> &str {
        &self.shared.command
    }

    pub fn args(&self) -> &[String] {
        &self.shared.args
    }

    /// Caller-supplied environment overlay
    pub fn environment(&self) -> &HashMap<String, String> {
        &self.shared.environment
    }

    /// `command arg1 arg2 ...`, for diagnostics
    pub fn command_line(&self) -> String {
        std::iter::once(self.shared.command.as_str())
            .chain(self.shared.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn state(&self) -> ProcessState {
        *self.shared.state.lock()
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.shared.stdout.lock()).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.shared.stderr.lock()).into_owned()
    }

    pub fn stdout_bytes(&self) -> Vec<u8> {
        self.shared.stdout.lock().clone()
    }

    /// Exit outcome, once the OS has reported it
    pub fn exit(&self) -> Option<ExitOutcome> {
        *self.shared.exit.borrow()
    }

    /// Wait until the process exits on its own (or is killed)
    pub async fn wait_for_exit(&self) -> ExitOutcome {
        let mut rx = self.shared.exit.subscribe();
        loop {
            if let Some(outcome) = *rx.borrow_and_update() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return self.exit().unwrap_or_default();
            }
        }
    }

    pub(crate) fn append(&self, stream: Stream, chunk: &[u8]) {
        let buffer = match stream {
            Stream::Stdout => &self.shared.stdout,
            Stream::Stderr => &self.shared.stderr,
        };
        buffer.lock().extend_from_slice(chunk);
    }

    pub(crate) fn set_state(&self, state: ProcessState) {
        *self.shared.state.lock() = state;
    }

    pub(crate) fn record_exit(&self, outcome: ExitOutcome) {
        self.shared.exit.send_replace(Some(outcome));
    }

    pub(crate) fn clear_buffers(&self) {
        self.shared.stdout.lock().clear();
        self.shared.stderr.lock().clear();
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid())
            .field("command", &self.command_line())
            .field("state", &self.state())
            .field("exit", &self.exit())
            .finish()
    }
}
