//! Reconciliation: definitions survive restarts, and sync() re-converges
//! the store with the live job set after manual damage.

use crate::prelude::*;
use std::sync::Arc;
use taskmill_core::{SystemClock, TriggerSpec};
use taskmill_engine::{ProvisionCache, RegistryConfig, TaskRegistry};

#[tokio::test(flavor = "multi_thread")]
async fn definitions_and_status_survive_restart() {
    let mill = Mill::new();
    mill.add_task("keeper", 3600, "echo kept");
    mill.add_task("napper", 3600, "echo asleep");
    mill.registry.pause_task("napper").unwrap();
    mill.registry.shutdown();

    let reopened = TaskRegistry::open(
        RegistryConfig::at(mill.state.path()),
        Arc::new(SystemClock),
        Arc::new(ProvisionCache::noop()),
    )
    .unwrap();
    reopened.start().unwrap();

    assert_eq!(reopened.list_tasks().len(), 2);
    assert!(reopened.scheduler().contains("keeper"));
    assert!(reopened.scheduler().contains("napper"));

    let jobs = reopened.scheduler().jobs();
    let napper = jobs.iter().find(|j| j.id == "napper").unwrap();
    assert!(napper.paused);
    let keeper = jobs.iter().find(|j| j.id == "keeper").unwrap();
    assert!(!keeper.paused);
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_project_fails_runs_gracefully_and_sync_removes_the_job() {
    let mill = Mill::new();
    mill.add_task("stray", 3600, "echo never");
    mill.add_task("fine", 3600, "echo still-works");

    std::fs::remove_dir_all(mill.project.path()).unwrap();

    // A run against the missing project fails that execution only.
    mill.registry.run_task("stray").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!mill.registry.is_running("stray").unwrap());

    mill.registry.sync().unwrap();
    assert!(!mill.registry.scheduler().contains("stray"));
    // The definition is never deleted by a missing project.
    assert!(mill.registry.task("stray").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_drops_stale_definitions_and_orphan_jobs() {
    let mill = Mill::new();
    mill.add_task("stale", 3600, "true");

    // Orphan job: registered directly, no definition behind it.
    mill.registry
        .scheduler()
        .add(
            "orphan",
            || {},
            taskmill_core::Trigger::every(std::time::Duration::from_secs(3600)),
            Some(1),
        )
        .unwrap();
    // Stale definition: its job vanished out from under it.
    mill.registry.scheduler().remove("stale").unwrap();

    mill.registry.sync().unwrap();

    assert!(!mill.registry.scheduler().contains("orphan"));
    assert!(mill.registry.task("stale").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn store_is_updated_on_every_mutation() {
    let mill = Mill::new();
    mill.add_task("audit", 60, "true");
    mill.registry
        .set_task("audit", "demo", TriggerSpec::Interval(120), "date")
        .unwrap();

    let raw = std::fs::read_to_string(mill.state.path().join("tasks.json")).unwrap();
    assert!(raw.contains("\"audit\""));
    assert!(raw.contains("120"));
    assert!(raw.contains("date"));

    mill.registry.remove_task("audit").unwrap();
    let raw = std::fs::read_to_string(mill.state.path().join("tasks.json")).unwrap();
    assert!(!raw.contains("\"audit\""));
}
