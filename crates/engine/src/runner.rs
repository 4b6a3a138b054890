// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task execution: one runner per task, one live subprocess at most.
//!
//! `run` is deliberately synchronous and occupies its blocking worker slot
//! for the whole subprocess lifetime; combined with the scheduler's
//! per-job cap this guarantees at most one concurrent run per task without
//! extra bookkeeping. `kill` may race a natural exit from another thread:
//! taking the child out of the handle slot is a single atomic step, so a
//! reused or already-cleared handle is never signalled.

use crate::provision::{ProvisionCache, ProvisioningError};
use crate::rotating_log::{LogError, RotatingLog};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskmill_core::ProjectReference;
use thiserror::Error;

/// How often `kill` polls for exit during the grace period.
const KILL_POLL: Duration = Duration::from_millis(50);

/// Errors from running or stopping a task's subprocess.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("task not running: {0}")]
    TaskNotRunning(String),
    #[error("task already running: {0}")]
    AlreadyRunning(String),
    #[error("project for task '{task}' is missing: {path}")]
    ProjectMissing { task: String, path: String },
    #[error("failed to launch task '{task}': {source}")]
    Launch {
        task: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Executes one task's command as a subprocess inside its project directory,
/// streaming combined output into the task's rotating log.
pub struct TaskRunner {
    name: String,
    command: String,
    project: ProjectReference,
    provision: Arc<ProvisionCache>,
    log: Mutex<RotatingLog>,
    handle: Mutex<Option<Child>>,
    /// How long `kill` waits for graceful exit before escalating.
    grace: Duration,
}

impl TaskRunner {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        project: ProjectReference,
        provision: Arc<ProvisionCache>,
        log: RotatingLog,
        grace: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            project,
            provision,
            log: Mutex::new(log),
            handle: Mutex::new(None),
            grace,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the task's command to completion, blocking the calling thread.
    ///
    /// Returns the process exit code; a non-zero exit is `Ok`, only failure
    /// to launch is an error. Returns `-1` when the process was terminated
    /// by `kill` (or a signal) before exiting on its own.
    pub fn run(&self) -> Result<i32, RunnerError> {
        let exec_dir = self
            .project
            .exec_dir()
            .ok_or_else(|| RunnerError::ProjectMissing {
                task: self.name.clone(),
                path: self.project.root.display().to_string(),
            })?
            .to_path_buf();

        self.provision.ensure(&self.project.root)?;

        // `exec 2>&1` folds the shell's own stderr into the stdout pipe, so
        // the log captures launch diagnostics as well as command output.
        let script = format!("exec 2>&1\n{}", self.command);
        let mut child = Command::new("bash")
            .arg("-c")
            .arg(&script)
            .current_dir(&exec_dir)
            .env_remove("VIRTUAL_ENV")
            .env_remove("PYTHONPATH")
            .env_remove("PYTHONHOME")
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RunnerError::Launch {
                task: self.name.clone(),
                source: e,
            })?;

        let stdout = child.stdout.take();

        {
            let mut handle = self.handle.lock();
            if handle.is_some() {
                // A previous run is still alive; refuse to double-spawn.
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunnerError::AlreadyRunning(self.name.clone()));
            }
            *handle = Some(child);
        }

        tracing::info!(task = %self.name, command = %self.command, cwd = %exec_dir.display(), "task started");

        if let Some(stdout) = stdout {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if let Err(e) = self.log.lock().log(&line, "INFO") {
                            // Log failures must not abort the run.
                            tracing::warn!(task = %self.name, error = %e, "failed to write task log");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(task = %self.name, error = %e, "task output read failed");
                        break;
                    }
                }
            }
        }

        // EOF: take the child back unless kill() already did.
        let exit_code = match self.handle.lock().take() {
            Some(mut child) => match child.wait() {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    tracing::warn!(task = %self.name, error = %e, "wait on task process failed");
                    -1
                }
            },
            None => -1, // killed concurrently
        };

        if let Err(e) = self.log.lock().close() {
            tracing::warn!(task = %self.name, error = %e, "failed to flush task log");
        }
        tracing::info!(task = %self.name, exit_code, "task finished");
        Ok(exit_code)
    }

    /// Request graceful termination, escalating to SIGKILL after the grace
    /// period. The handle is always cleared, even on error.
    pub fn kill(&self) -> Result<(), RunnerError> {
        // Swap-and-check: once taken, no other caller can signal this child.
        let Some(mut child) = self.handle.lock().take() else {
            return Err(RunnerError::TaskNotRunning(self.name.clone()));
        };

        let pid = Pid::from_raw(child.id() as i32);
        tracing::info!(task = %self.name, pid = child.id(), "terminating task");
        if let Err(e) = kill(pid, Signal::SIGTERM) {
            tracing::warn!(task = %self.name, error = %e, "SIGTERM failed; escalating");
        }

        let deadline = Instant::now() + self.grace;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return Ok(()),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    std::thread::sleep(KILL_POLL);
                }
                Err(e) => {
                    tracing::warn!(task = %self.name, error = %e, "try_wait failed during kill");
                    break;
                }
            }
        }

        tracing::warn!(task = %self.name, "grace period elapsed; sending SIGKILL");
        if let Err(e) = child.kill() {
            tracing::warn!(task = %self.name, error = %e, "SIGKILL failed");
        }
        let _ = child.wait();
        Ok(())
    }

    /// Whether a subprocess for this task is currently alive. Reflects
    /// reality immediately after a natural exit: the check reaps exit
    /// status rather than trusting a flag.
    pub fn is_running(&self) -> bool {
        match self.handle.lock().as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Up to `limit` most-recent log lines, newest first.
    pub fn get_logs(&self, limit: usize) -> Result<Vec<String>, RunnerError> {
        Ok(self.log.lock().readlines(limit)?)
    }

    /// Delete this task's log files, active and backups.
    pub fn purge_logs(&self) -> Result<(), RunnerError> {
        Ok(self.log.lock().purge()?)
    }

    /// Paths of this task's active log (backups live beside it).
    pub fn log_path(&self) -> std::path::PathBuf {
        self.log.lock().path().to_path_buf()
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
