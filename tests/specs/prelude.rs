//! Test helpers for behavioral specifications.
//!
//! Provides a throwaway registry fixture with its own state and project
//! directories.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taskmill_core::{SystemClock, TriggerSpec};
use taskmill_engine::{ProvisionCache, RegistryConfig, TaskRegistry};
use tempfile::TempDir;

pub const POLL_INTERVAL: Duration = Duration::from_millis(25);
pub const WAIT_MAX: Duration = Duration::from_secs(5);

/// A registry wired to throwaway state and project directories. The default
/// project is registered as `"demo"`.
pub struct Mill {
    pub registry: TaskRegistry,
    pub state: TempDir,
    pub project: TempDir,
}

impl Mill {
    /// Build and start a fresh registry. Must run inside a tokio runtime.
    pub fn new() -> Self {
        let state = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let registry = TaskRegistry::open(
            RegistryConfig::at(state.path()),
            Arc::new(SystemClock),
            Arc::new(ProvisionCache::noop()),
        )
        .unwrap();
        registry.start().unwrap();
        registry.set_project("demo", project.path()).unwrap();
        Self {
            registry,
            state,
            project,
        }
    }

    /// Register a task in the demo project with an interval trigger.
    pub fn add_task(&self, name: &str, interval_secs: u64, command: &str) {
        self.registry
            .set_task(name, "demo", TriggerSpec::Interval(interval_secs), command)
            .unwrap();
    }

    /// Path of the task's active log file.
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.state.path().join("logs").join(format!("{name}.log"))
    }

    /// True once the task's log contains `needle`.
    pub fn logged(&self, name: &str, needle: &str) -> bool {
        self.registry
            .get_logs(name, 100)
            .map(|lines| lines.iter().any(|l| l.contains(needle)))
            .unwrap_or(false)
    }
}

/// Poll until `cond` holds or [`WAIT_MAX`] elapses.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let mut waited = Duration::ZERO;
    while waited < WAIT_MAX {
        if cond() {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
        waited += POLL_INTERVAL;
    }
    false
}
