//! Process harness - lifecycle orchestration

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::process::{Output, Stdio};

use serde_json::Value;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    capture::{self, Mirror},
    config::{HarnessConfig, TeardownOptions},
    error::{ProcessError, Result},
    handle::{ExitOutcome, ProcessHandle, ProcessState, Stream},
    transcript::Transcript,
    tree,
    workdir::WorkDir,
};

struct LiveProcess {
    handle: ProcessHandle,
    /// Owns the `Child` and records its exit
    waiter: JoinHandle<()>,
    readers: Vec<JoinHandle<()>>,
}

/// Supervises at most one spawned process inside a private work dir
pub struct ProcessHarness {
    config: HarnessConfig,
    workdir: Option<WorkDir>,
    live: Option<LiveProcess>,
}

impl ProcessHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            workdir: None,
            live: None,
        }
    }

    /// Run in an existing work dir instead of a fresh temp dir
    pub fn with_workdir(mut self, workdir: WorkDir) -> Self {
        self.workdir = Some(workdir);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn workdir(&self) -> Option<&WorkDir> {
        self.workdir.as_ref()
    }

    /// The tracked process, if any
    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.live.as_ref().map(|live| &live.handle)
    }

    /// Create the work dir if needed and write a fixture tree into it
    pub fn setup(&mut self, tree: &Value) -> Result<&mut Self> {
        self.ensure_workdir()?.setup(tree)?;
        Ok(self)
    }

    /// Run an arbitrary preparation step against the work dir
    pub fn hook<F>(&mut self, hook: F) -> Result<&mut Self>
    where
        F: FnOnce(&Path) -> io::Result<()>,
    {
        hook(self.ensure_workdir()?.path())?;
        Ok(self)
    }

    fn ensure_workdir(&mut self) -> Result<&WorkDir> {
        if self.workdir.is_none() {
            let workdir = WorkDir::create()?;
            debug!(path = %workdir.path().display(), "Created work dir");
            self.workdir = Some(workdir);
        }
        self.current_workdir()
    }

    fn current_workdir(&self) -> Result<&WorkDir> {
        self.workdir
            .as_ref()
            .filter(|workdir| workdir.exists())
            .ok_or(ProcessError::MissingWorkDir)
    }

    fn command(&self, command: &str, args: &[String], environment: &HashMap<String, String>) -> Result<Command> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(self.current_workdir()?.path())
            .envs(&self.config.base_env)
            .envs(environment)
            .stdin(Stdio::null());
        Ok(cmd)
    }

    /// Spawn a process in the work dir and start capturing its output
    ///
    /// `environment` overlays the ambient environment (and the configured
    /// base environment); it does not replace it.
    ///
    /// # Examples
    /// ```no_run
    /// use std::collections::HashMap;
    /// use buildrig_process::{HarnessConfig, ProcessHarness, TeardownOptions};
    /// use serde_json::json;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut harness = ProcessHarness::new(HarnessConfig::new());
    /// harness.setup(&json!({ "index.js": "console.log('hello')" }))?;
    /// let handle = harness.spawn("node", ["index.js"], HashMap::new()).await?;
    /// handle.wait_for_exit().await;
    /// harness.teardown(TeardownOptions::default()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn spawn<I, S>(
        &mut self,
        command: impl Into<String>,
        args: I,
        environment: HashMap<String, String>,
    ) -> Result<ProcessHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(live) = &self.live {
            return Err(ProcessError::ConcurrentProcess {
                pid: live.handle.pid(),
            });
        }

        let command = command.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        debug!(command = %command, args = ?args, "Spawning process");

        let mut cmd = self.command(&command, &args, &environment)?;
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: command.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| ProcessError::Spawn {
            command: command.clone(),
            source: io::Error::new(io::ErrorKind::Other, "Failed to get process ID"),
        })?;

        let handle = ProcessHandle::new(pid, command.clone(), args, environment);
        let mirror = Mirror {
            debug: self.config.debug,
            prefix: self.config.log_prefix.clone(),
            stderr: self.config.mirror_stderr,
            stdout_to: self.config.stdout_mirror.clone(),
            stderr_to: self.config.stderr_mirror.clone(),
        };

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(capture::spawn_reader(
                stdout,
                Stream::Stdout,
                handle.clone(),
                self.config.log_sink.clone(),
                mirror.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(capture::spawn_reader(
                stderr,
                Stream::Stderr,
                handle.clone(),
                self.config.log_sink.clone(),
                mirror,
            ));
        }

        let exited = handle.clone();
        let waiter = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    let outcome = ExitOutcome::from(status);
                    debug!(pid, %outcome, "Process exited");
                    exited.record_exit(outcome);
                }
                Err(e) => warn!(pid, error = %e, "Error waiting for process"),
            }
        });

        handle.set_state(ProcessState::Running);
        info!(pid, command = %command, "Process spawned");

        self.live = Some(LiveProcess {
            handle: handle.clone(),
            waiter,
            readers,
        });
        Ok(handle)
    }

    /// Run a command to completion in the work dir
    ///
    /// Independent of the tracked process; useful for a build step before
    /// spawning a long-running server.
    pub async fn execute<I, S>(
        &self,
        command: impl Into<String>,
        args: I,
        environment: HashMap<String, String>,
    ) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = command.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        debug!(command = %command, args = ?args, "Executing to completion");

        self.command(&command, &args, &environment)?
            .output()
            .await
            .map_err(|source| ProcessError::Spawn { command, source })
    }

    /// Kill the tracked process and all of its descendants
    ///
    /// Resolves immediately when nothing is tracked. Returns the output the
    /// run produced; the handle's own buffers are cleared.
    pub async fn teardown(&mut self, options: TeardownOptions) -> Result<Option<Transcript>> {
        let Some(mut live) = self.live.take() else {
            return Ok(None);
        };
        let pid = live.handle.pid();
        live.handle.set_state(ProcessState::Terminating);
        debug!(pid, "Tearing down process tree");

        // Once reaped, the pid may already belong to someone else.
        let targets = if live.handle.exit().is_some() {
            Vec::new()
        } else {
            match tree::collect(self.config.process_table.as_ref(), pid) {
                Ok(targets) => targets,
                Err(source) => {
                    warn!(pid, error = %source, "Process tree enumeration failed");
                    self.live = Some(live);
                    return Err(ProcessError::Teardown { pid, source });
                }
            }
        };
        tree::kill_all(&targets).await;

        if timeout(self.config.reap_timeout, &mut live.waiter).await.is_err() {
            warn!(pid, "Timeout waiting for process to exit");
            live.waiter.abort();
        }
        for reader in live.readers.iter_mut() {
            if timeout(self.config.drain_timeout, reader).await.is_err() {
                debug!(pid, "Output stream still open after kill");
            }
        }
        for reader in &live.readers {
            reader.abort();
        }

        let transcript = Transcript::capture(&live.handle);
        live.handle.clear_buffers();
        live.handle.set_state(ProcessState::Terminated);
        info!(pid, killed = targets.len(), "Process torn down");

        if options.preserve_workdir {
            self.keep_workdir();
        } else if let Some(workdir) = self.workdir.take() {
            workdir.remove()?;
        }

        Ok(Some(transcript))
    }

    /// Leave the work dir on disk even if the harness is dropped without teardown
    pub fn keep_workdir(&mut self) {
        if let Some(workdir) = self.workdir.as_mut() {
            info!(path = %workdir.path().display(), "Keeping work dir");
            workdir.persist();
        }
    }

    /// Teardown that keeps the work dir of a failed run when configured to
    pub async fn teardown_after_failure(&mut self, failed: bool) -> Result<Option<Transcript>> {
        if failed {
            if let (Some(live), Some(workdir)) = (&self.live, &self.workdir) {
                warn!(
                    path = %workdir.path().display(),
                    command = %live.handle.command_line(),
                    "Run failed"
                );
            }
        }
        let options = TeardownOptions {
            preserve_workdir: failed && self.config.keep_on_fail,
        };
        self.teardown(options).await
    }
}

impl Drop for ProcessHarness {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            warn!(pid = live.handle.pid(), "Harness dropped without teardown; killing process");
            live.waiter.abort();
        }
    }
}
