// tests/process_runner.rs
#![cfg(unix)]

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use dfu_harness::errors::ExecError;
use dfu_harness::exec::{
    MissingDependency, MissingDependencyTable, Output, ProcessRunner, run,
};

type TestResult = Result<(), Box<dyn Error>>;

const SH: &str = "/bin/sh";

fn numbered_lines(prefix: &str, count: usize) -> String {
    (0..count).map(|i| format!("{prefix}{i}\n")).collect()
}

#[tokio::test]
async fn captures_exit_code_and_both_streams() -> TestResult {
    init_tracing();

    let exec = run(SH, ["-c", "printf out; printf err >&2; exit 4"]);
    let output = with_timeout(exec.wait_output()).await?;

    assert_eq!(
        output,
        Output {
            exit_code: 4,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn arguments_are_passed_without_shell_expansion() -> TestResult {
    init_tracing();

    let exec = run(
        SH,
        ["-c", r#"printf '%s|' "$@""#, "sh", "$HOME", "*", "a b", ""],
    );
    let output = with_timeout(exec.wait_output()).await?;

    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout, "$HOME|*|a b||");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_keep_their_streams_apart() -> TestResult {
    init_tracing();

    let script = |tag: &str| {
        format!(
            "i=0; while [ $i -lt 300 ]; do echo {tag}$i; echo {tag}-err$i >&2; i=$((i+1)); done"
        )
    };
    let a = run(SH, ["-c".to_string(), script("A")]);
    let b = run(SH, ["-c".to_string(), script("B")]);

    let (a_out, b_out) = with_timeout(async { tokio::join!(a.wait_output(), b.wait_output()) }).await;
    let (a_out, b_out) = (a_out?, b_out?);

    assert_eq!(a_out.stdout, numbered_lines("A", 300));
    assert_eq!(a_out.stderr, numbered_lines("A-err", 300));
    assert_eq!(b_out.stdout, numbered_lines("B", 300));
    assert_eq!(b_out.stderr, numbered_lines("B-err", 300));
    Ok(())
}

#[tokio::test]
async fn subscribers_see_exactly_what_accumulates() -> TestResult {
    init_tracing();

    let exec = run(
        SH,
        ["-c", "sleep 0.2; printf hello; sleep 0.1; printf ' world' >&2; printf again"],
    );

    let out_chunks = Arc::new(Mutex::new(Vec::<String>::new()));
    let err_chunks = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&out_chunks);
    let _out = exec.on_stdout(move |c| sink.lock().unwrap().push(c.to_string()));
    let sink = Arc::clone(&err_chunks);
    let _err = exec.on_stderr(move |c| sink.lock().unwrap().push(c.to_string()));

    let output = with_timeout(exec.wait_output()).await?;

    assert_eq!(out_chunks.lock().unwrap().concat(), output.stdout);
    assert_eq!(err_chunks.lock().unwrap().concat(), output.stderr);
    assert_eq!(output.stdout, "helloagain");
    assert_eq!(output.stderr, " world");
    Ok(())
}

#[tokio::test]
async fn follow_replays_output_produced_before_subscribing() -> TestResult {
    init_tracing();

    let exec = run(SH, ["-c", "printf early; sleep 0.2; printf late"]);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let seen = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&seen);
    let _sub = exec.follow_stdout(move |c| sink.lock().unwrap().push_str(c));

    let output = with_timeout(exec.wait_output()).await?;
    assert_eq!(*seen.lock().unwrap(), "earlylate");
    assert_eq!(output.stdout, "earlylate");
    Ok(())
}

#[tokio::test]
async fn unsubscribe_stops_delivery_but_not_accumulation() -> TestResult {
    init_tracing();

    let exec = run(SH, ["-c", "sleep 0.1; printf first; sleep 0.3; printf second"]);

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let sub = exec.on_stdout(move |c| {
        let _ = tx.send(c.to_string());
    });

    let first = with_timeout(rx.recv()).await;
    assert_eq!(first.as_deref(), Some("first"));
    assert!(sub.unsubscribe());

    let output = with_timeout(exec.wait_output()).await?;
    assert_eq!(output.stdout, "firstsecond");
    // The callback (and with it the sender) is gone.
    assert_eq!(rx.recv().await, None);
    Ok(())
}

#[tokio::test]
async fn callbacks_can_read_accumulated_output_mid_run() -> TestResult {
    init_tracing();

    let exec = Arc::new(run(SH, ["-c", "printf a; sleep 0.1; printf b; exit 3"]));
    let snapshots = Arc::new(Mutex::new(Vec::<String>::new()));

    let reader = Arc::downgrade(&exec);
    let sink = Arc::clone(&snapshots);
    let _sub = exec.on_stdout(move |_| {
        if let Some(exec) = reader.upgrade() {
            sink.lock().unwrap().push(exec.stdout());
        }
    });

    assert_eq!(with_timeout(exec.exit_code()).await?, 3);

    let snapshots = snapshots.lock().unwrap();
    assert_eq!(snapshots.last().map(String::as_str), Some("ab"));
    assert!(snapshots.iter().all(|s| "ab".starts_with(s.as_str())));
    Ok(())
}

#[tokio::test]
async fn panicking_subscriber_does_not_lose_the_exit_code() -> TestResult {
    init_tracing();

    let exec = run(SH, ["-c", "sleep 0.1; printf hi; exit 5"]);
    let _sub = exec.on_stdout(|_| panic!("subscriber bug"));

    let output = with_timeout(exec.wait_output()).await?;
    assert_eq!(output.exit_code, 5);
    assert_eq!(output.stdout, "hi");
    Ok(())
}

#[tokio::test]
async fn completion_can_be_awaited_repeatedly() -> TestResult {
    init_tracing();

    let exec = run(SH, ["-c", "exit 7"]);
    assert_eq!(with_timeout(exec.exit_code()).await?, 7);
    assert_eq!(with_timeout(exec.exit_code()).await?, 7);
    assert_eq!(exec.try_exit_code(), Some(Ok(7)));
    Ok(())
}

#[tokio::test]
async fn death_by_signal_is_reported_with_its_name() -> TestResult {
    init_tracing();

    let exec = run(SH, ["-c", "kill -9 $$"]);
    let result = with_timeout(exec.exit_code()).await;

    assert_eq!(
        result,
        Err(ExecError::SignalTermination {
            signal: "SIGKILL".to_string()
        })
    );
    Ok(())
}

#[tokio::test]
async fn handle_delivers_signals_to_the_child() -> TestResult {
    init_tracing();

    let exec = run(SH, ["-c", "exec sleep 30"]);
    assert!(exec.handle().pid().is_some());
    assert!(exec.handle().is_running());

    exec.handle()
        .signal(nix::sys::signal::Signal::SIGTERM)?;

    let result = with_timeout(exec.exit_code()).await;
    assert_eq!(
        result,
        Err(ExecError::SignalTermination {
            signal: "SIGTERM".to_string()
        })
    );
    assert!(!exec.handle().is_running());
    assert!(exec.handle().kill().is_err(), "reaped process must not be signalled");
    Ok(())
}

#[tokio::test]
async fn missing_executable_is_a_launch_failure() -> TestResult {
    init_tracing();

    let exec = run("/nonexistent/dfu-programmer", ["--help"]);
    assert!(exec.handle().pid().is_none());

    match with_timeout(exec.exit_code()).await {
        Err(ExecError::LaunchFailure { kind, path, .. }) => {
            assert_eq!(kind, io::ErrorKind::NotFound);
            assert_eq!(path, std::path::PathBuf::from("/nonexistent/dfu-programmer"));
        }
        other => panic!("expected LaunchFailure, got {other:?}"),
    }
    assert_eq!(exec.stdout(), "");
    assert_eq!(exec.stderr(), "");
    Ok(())
}

#[tokio::test]
async fn non_executable_file_is_a_launch_failure() -> TestResult {
    init_tracing();

    let file = tempfile::NamedTempFile::new()?;
    let exec = run(file.path(), [] as [&str; 0]);

    match with_timeout(exec.exit_code()).await {
        Err(ExecError::LaunchFailure { kind, .. }) => {
            assert_eq!(kind, io::ErrorKind::PermissionDenied);
        }
        other => panic!("expected LaunchFailure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn relative_paths_are_not_searched() -> TestResult {
    init_tracing();

    let exec = run("sh", ["-c", "exit 0"]);
    match with_timeout(exec.exit_code()).await {
        Err(ExecError::LaunchFailure { kind, .. }) => {
            assert_eq!(kind, io::ErrorKind::InvalidInput);
        }
        other => panic!("expected LaunchFailure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn table_codes_become_missing_dependency_errors() -> TestResult {
    init_tracing();

    let runner = ProcessRunner::with_missing_dependencies(MissingDependencyTable::new(vec![
        MissingDependency {
            code: 42,
            message: "libusb is probably missing.".to_string(),
        },
    ]));

    let remapped = runner.run(SH, ["-c", "exit 42"]);
    assert_eq!(
        with_timeout(remapped.exit_code()).await,
        Err(ExecError::MissingDependency {
            code: 42,
            message: "libusb is probably missing.".to_string()
        })
    );

    let untouched = runner.run(SH, ["-c", "exit 41"]);
    assert_eq!(with_timeout(untouched.exit_code()).await, Ok(41));
    Ok(())
}
