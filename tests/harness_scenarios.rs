//! End-to-end harness scenarios against real processes
//!
//! Covers spawn, capture, readiness polling and tree teardown together.

#![cfg(unix)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use buildrig_poll::{conditions, retry_until, RetryPolicy};
use buildrig_process::{
    FileLogSink, HarnessConfig, MemoryLogSink, ProcessError, ProcessHarness, ProcessState,
    TeardownOptions,
};
use serde_json::json;
use sysinfo::{Pid, ProcessStatus, System};

/// Present in the process table and not a zombie
fn is_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes();
    system
        .process(Pid::from_u32(pid))
        .map(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
        .unwrap_or(false)
}

async fn wait_until_gone(pid: u32) -> bool {
    let policy = RetryPolicy::fixed_ms(50).timeout(Duration::from_secs(5));
    retry_until(&policy, || async move {
        if is_alive(pid) {
            Err(format!("{} still running", pid))
        } else {
            Ok(())
        }
    })
    .await
    .is_ok()
}

fn quiet_harness() -> ProcessHarness {
    let mut harness = ProcessHarness::new(HarnessConfig::new().mirror_stderr(false));
    harness
        .setup(&json!({ "package.json": "{}", "src": { "client.js": "" } }))
        .unwrap();
    harness
}

#[tokio::test]
async fn hello_is_captured_and_workdir_removed() {
    let mut harness = quiet_harness();
    let workdir = harness.workdir().unwrap().path().to_path_buf();

    let handle = harness
        .spawn("sh", ["-c", "printf hello"], HashMap::new())
        .await
        .unwrap();
    assert!(handle.pid() > 0);
    assert_eq!(handle.wait_for_exit().await.code, Some(0));

    let transcript = harness
        .teardown(TeardownOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(transcript.stdout, "hello");
    assert_eq!(transcript.exit.and_then(|e| e.code), Some(0));
    assert!(!workdir.exists());
    assert_eq!(handle.state(), ProcessState::Terminated);
}

#[tokio::test]
async fn teardown_kills_background_grandchild() {
    let mut harness = quiet_harness();
    let handle = harness
        .spawn("sh", ["-c", "sleep 10 & echo $!; wait"], HashMap::new())
        .await
        .unwrap();
    let parent = handle.pid();

    let policy = RetryPolicy::fixed_ms(10).timeout(Duration::from_secs(5));
    let child: u32 = retry_until(&policy, || {
        let out = handle.stdout_text();
        async move { out.trim().parse::<u32>().map_err(|e| e.to_string()) }
    })
    .await
    .unwrap();
    assert!(is_alive(child));

    harness.teardown(TeardownOptions::default()).await.unwrap();

    assert!(wait_until_gone(parent).await, "parent {} survived", parent);
    assert!(wait_until_gone(child).await, "grandchild {} survived", child);
    assert!(handle.exit().and_then(|e| e.signal).is_some());
}

#[tokio::test]
async fn second_spawn_fails_without_touching_first() {
    let mut harness = quiet_harness();
    let first = harness.spawn("sleep", ["10"], HashMap::new()).await.unwrap();

    let err = harness
        .spawn("sleep", ["10"], HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::ConcurrentProcess { pid } if pid == first.pid()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(first.exit().is_none());
    assert!(is_alive(first.pid()));
    assert_eq!(first.state(), ProcessState::Running);

    harness.teardown(TeardownOptions::default()).await.unwrap();
    assert!(wait_until_gone(first.pid()).await);
}

#[tokio::test]
async fn preserve_workdir_flag_is_honoured() {
    for preserve in [false, true] {
        let mut harness = quiet_harness();
        let workdir = harness.workdir().unwrap().path().to_path_buf();
        harness.spawn("sleep", ["10"], HashMap::new()).await.unwrap();

        harness
            .teardown(TeardownOptions {
                preserve_workdir: preserve,
            })
            .await
            .unwrap();

        assert_eq!(workdir.exists(), preserve);
        if preserve {
            std::fs::remove_dir_all(&workdir).unwrap();
        }
    }
}

#[tokio::test]
async fn second_teardown_is_a_noop() {
    let sink = Arc::new(MemoryLogSink::new());
    let mut harness = ProcessHarness::new(
        HarnessConfig::new()
            .mirror_stderr(false)
            .log_sink(sink.clone()),
    );
    harness.setup(&json!({ "a": "" })).unwrap();

    let handle = harness
        .spawn("sh", ["-c", "echo ready"], HashMap::new())
        .await
        .unwrap();
    handle.wait_for_exit().await;

    assert!(harness.teardown(TeardownOptions::default()).await.unwrap().is_some());
    let logged = sink.len();
    assert!(harness.teardown(TeardownOptions::default()).await.unwrap().is_none());
    assert_eq!(sink.len(), logged);
}

#[tokio::test]
async fn output_log_survives_the_run() {
    let logs = tempfile::tempdir().unwrap();
    let log_path = logs.path().join("target").join("server.log");
    let sink = Arc::new(FileLogSink::open(&log_path).unwrap());

    let mut harness = ProcessHarness::new(
        HarnessConfig::new().mirror_stderr(false).log_sink(sink),
    );
    harness.setup(&json!({ "a": "" })).unwrap();
    let handle = harness
        .spawn(
            "sh",
            ["-c", "echo 'hello world!'; echo 'error message!' 1>&2"],
            HashMap::new(),
        )
        .await
        .unwrap();
    handle.wait_for_exit().await;
    harness.teardown(TeardownOptions::default()).await.unwrap();
    drop(harness);

    let logged = std::fs::read_to_string(&log_path).unwrap();
    assert!(logged.contains("hello world!"));
    assert!(logged.contains("error message!"));
}

#[tokio::test]
async fn wait_for_server_log_then_teardown() {
    let mut harness = quiet_harness();
    let handle = harness
        .spawn(
            "sh",
            ["-c", "sleep 0.3; mkdir -p target; echo started > target/server.log; sleep 10"],
            HashMap::new(),
        )
        .await
        .unwrap();
    let log = harness.workdir().unwrap().join("target/server.log").unwrap();

    let policy = RetryPolicy::fixed_ms(400).timeout(Duration::from_secs(10));
    retry_until(&policy, || conditions::file_exists(&log))
        .await
        .unwrap();

    assert_eq!(
        harness.workdir().unwrap().content("target/server.log").unwrap(),
        "started"
    );
    assert!(handle.exit().is_none());

    harness.teardown(TeardownOptions::default()).await.unwrap();
    assert!(wait_until_gone(handle.pid()).await);
}
