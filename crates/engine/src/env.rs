// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine.

use std::path::PathBuf;
use std::time::Duration;

use crate::registry::RegistryError;

/// Default cap on a task's active log file, in bytes.
pub const DEFAULT_LOG_MAX_BYTES: u64 = 1024 * 1024;
/// Default number of rotated log backups kept per task.
pub const DEFAULT_LOG_BACKUPS: u32 = 5;
/// Default grace period before a terminated task is force-killed.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Resolve state directory: TASKMILL_STATE_DIR > XDG_STATE_HOME/taskmill >
/// ~/.local/state/taskmill
pub fn state_dir() -> Result<PathBuf, RegistryError> {
    if let Ok(dir) = std::env::var("TASKMILL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("taskmill"));
    }
    let home = std::env::var("HOME").map_err(|_| RegistryError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/taskmill"))
}

/// Per-task log size cap override
pub fn log_max_bytes() -> u64 {
    std::env::var("TASKMILL_LOG_MAX_BYTES")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_LOG_MAX_BYTES)
}

/// Rotated backup count override
pub fn log_backups() -> u32 {
    std::env::var("TASKMILL_LOG_BACKUPS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(DEFAULT_LOG_BACKUPS)
}

/// Kill grace period override
pub fn kill_grace() -> Duration {
    std::env::var("TASKMILL_KILL_GRACE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_KILL_GRACE)
}

/// Project provisioning command, split on whitespace. `None` disables
/// provisioning entirely.
pub fn provision_command() -> Option<(String, Vec<String>)> {
    let raw = std::env::var("TASKMILL_PROVISION_CMD").ok()?;
    let mut parts = raw.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
