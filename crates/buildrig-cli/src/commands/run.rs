// `buildrig run`: supervise one command end to end

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use reqwest::Client;
use tracing::{error, info, warn};

use buildrig_config::Settings;
use buildrig_poll::{conditions, retry, ConditionError, Failure, RetryError, RetryPolicy};
use buildrig_process::{FileLogSink, ProcessHandle, ProcessHarness, TeardownOptions, WorkDir};

use super::{harness_config, PollArgs};

/// Exit code used when the run is interrupted with Ctrl-C
const INTERRUPTED: i32 = 130;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run in this directory instead of a fresh temp dir; it is never deleted
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Append all output to this file (relative to the work dir)
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Ready once this file exists (relative to the work dir)
    #[arg(long, conflicts_with = "ready_url")]
    pub ready_file: Option<String>,

    /// Ready once this URL answers
    #[arg(long)]
    pub ready_url: Option<String>,

    /// Extra environment for the command, KEY=VALUE
    #[arg(short, long = "env", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Keep the work dir after the run
    #[arg(long)]
    pub keep: bool,

    /// Mirror the command's stdout
    #[arg(long)]
    pub debug: bool,

    #[command(flatten)]
    pub poll: PollArgs,

    /// Command and its arguments
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", raw)),
    }
}

pub async fn execute(args: RunArgs, settings: &Settings) -> anyhow::Result<i32> {
    let (command, command_args) = args
        .command
        .split_first()
        .context("no command given")?;

    // A temp work dir is removed on any early return unless kept.
    let mut workdir = match &args.workdir {
        Some(path) => WorkDir::at(path)?,
        None => WorkDir::create()?,
    };
    let keep = args.keep || args.workdir.is_some();
    if keep {
        workdir.persist();
    }

    let mut config = harness_config(&settings.harness);
    config.debug |= args.debug;
    if let Some(log) = args.log.as_ref().or(settings.harness.log_file.as_ref()) {
        let path = workdir.path().join(log);
        let sink = FileLogSink::open(&path)
            .with_context(|| format!("opening output log {}", path.display()))?;
        info!(path = %path.display(), "Writing output log");
        config = config.log_sink(Arc::new(sink));
    }

    let mut harness = ProcessHarness::new(config).with_workdir(workdir);
    let environment: HashMap<String, String> = args.env.iter().cloned().collect();
    let handle = harness
        .spawn(command.clone(), command_args.to_vec(), environment)
        .await?;

    let policy = args.poll.policy(&settings.poll);
    let client = Client::new();
    let ready = match (&args.ready_file, &args.ready_url) {
        (Some(file), _) => {
            let path = resolve(harness_dir(&harness)?, file);
            let path = path.as_path();
            until_ready(&handle, &policy, move || conditions::file_exists(path)).await
        }
        (None, Some(url)) => {
            let client = &client;
            let url = url.as_str();
            until_ready(&handle, &policy, move || async move {
                conditions::http_ok(client, url).await.map(drop)
            })
            .await
        }
        (None, None) => Ok(()),
    };

    let code = match ready {
        Ok(()) => {
            info!(pid = handle.pid(), "Ready");
            tokio::select! {
                outcome = handle.wait_for_exit() => outcome.code.unwrap_or(1),
                _ = tokio::signal::ctrl_c() => {
                    warn!(pid = handle.pid(), "Interrupted");
                    INTERRUPTED
                }
            }
        }
        Err(e) => {
            error!(attempts = e.attempts(), "Not ready: {}", e);
            handle
                .exit()
                .and_then(|outcome| outcome.code)
                .filter(|code| *code != 0)
                .unwrap_or(1)
        }
    };
    let failed = code != 0;

    let options = TeardownOptions {
        preserve_workdir: keep || (failed && settings.harness.keep_on_fail),
    };
    if options.preserve_workdir {
        if let Some(dir) = harness.workdir() {
            info!(path = %dir.path().display(), "Work dir kept");
        }
    }
    let transcript = harness.teardown(options).await?;

    if failed {
        if let Some(transcript) = transcript {
            eprint!("{}", transcript.render());
        }
    }
    Ok(code)
}

fn harness_dir(harness: &ProcessHarness) -> anyhow::Result<&Path> {
    harness
        .workdir()
        .map(WorkDir::path)
        .context("harness has no work dir")
}

fn resolve(base: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Poll `probe` until it passes, giving up early if the process exits
async fn until_ready<F, Fut>(
    handle: &ProcessHandle,
    policy: &RetryPolicy,
    mut probe: F,
) -> Result<(), RetryError<String>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ConditionError>>,
{
    retry(policy, || {
        let attempt = probe();
        let handle = handle.clone();
        async move {
            match attempt.await {
                Ok(()) => Ok(()),
                Err(e) => match handle.exit() {
                    Some(outcome) => Err(Failure::Fatal(format!(
                        "process exited ({}) before it was ready; last check: {}",
                        outcome, e
                    ))),
                    None => Err(Failure::Pending(e.to_string())),
                },
            }
        }
    })
    .await
}
