//! Task lifecycle: at most one subprocess per task, kill semantics, and
//! pause-preserving manual runs through the registry surface.

use crate::prelude::*;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn no_two_subprocesses_for_one_task_are_ever_alive() {
    let mill = Mill::new();
    // Each execution appends a marker, then lingers. A second fire while the
    // first is alive must be skipped, not queued.
    mill.add_task("solo", 3600, "echo fired >> markers; sleep 2");

    mill.registry.run_task("solo").await.unwrap();
    assert!(wait_until(|| mill.registry.is_running("solo").unwrap_or(false)).await);
    mill.registry.run_task("solo").await.unwrap();

    assert!(wait_until(|| !mill.registry.is_running("solo").unwrap_or(true)).await);
    let markers = std::fs::read_to_string(mill.project.path().join("markers")).unwrap();
    assert_eq!(markers.lines().count(), 1, "overlapping fire was not skipped");
}

#[tokio::test(flavor = "multi_thread")]
async fn kill_is_immediate_and_double_kill_fails() {
    let mill = Mill::new();
    mill.add_task("long", 3600, "sleep 30");

    mill.registry.run_task("long").await.unwrap();
    assert!(wait_until(|| mill.registry.is_running("long").unwrap_or(false)).await);

    mill.registry.stop_task("long").unwrap();
    assert!(!mill.registry.is_running("long").unwrap());

    let err = mill.registry.stop_task("long").unwrap_err();
    assert_eq!(err.code(), "task_not_running");
}

#[tokio::test(flavor = "multi_thread")]
async fn paused_task_runs_manually_and_stays_paused() {
    let mill = Mill::new();
    mill.add_task("quiet", 3600, "echo ran-anyway");
    mill.registry.pause_task("quiet").unwrap();

    mill.registry.run_task("quiet").await.unwrap();
    assert!(mill.registry.task("quiet").unwrap().is_paused());
    assert!(wait_until(|| mill.logged("quiet", "ran-anyway")).await);
    assert!(mill.registry.task("quiet").unwrap().is_paused());
}

#[tokio::test(flavor = "multi_thread")]
async fn removing_a_task_removes_job_and_future_runs_fail() {
    let mill = Mill::new();
    mill.add_task("doomed", 3600, "echo hello");
    mill.registry.run_task("doomed").await.unwrap();
    assert!(wait_until(|| mill.logged("doomed", "hello")).await);

    mill.registry.remove_task("doomed").unwrap();
    assert!(!mill.registry.scheduler().contains("doomed"));

    let err = mill.registry.run_task("doomed").await.unwrap_err();
    assert_eq!(err.code(), "task_not_found");
}

#[tokio::test(flavor = "multi_thread")]
async fn interval_task_fires_on_schedule() {
    let mill = Mill::new();
    mill.add_task("ticker", 1, "echo tick");
    assert!(wait_until(|| mill.logged("ticker", "tick")).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_command_is_logged_not_fatal() {
    let mill = Mill::new();
    mill.add_task("broken", 3600, "echo pre-crash; exit 3");
    mill.registry.run_task("broken").await.unwrap();
    assert!(wait_until(|| mill.logged("broken", "pre-crash")).await);

    // The engine is still healthy: another task runs fine.
    mill.add_task("healthy", 3600, "echo ok");
    mill.registry.run_task("healthy").await.unwrap();
    assert!(wait_until(|| mill.logged("healthy", "ok")).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
}
