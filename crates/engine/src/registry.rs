// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task registry: keeps persisted definitions, scheduler jobs, and runner
//! instances convergent.
//!
//! The definition's `status` field is the single source of truth; the
//! scheduler's pause state is mirrored from it on every mutation, never the
//! reverse. All definition changes are persisted before they are reported
//! successful.

use crate::env;
use crate::provision::ProvisionCache;
use crate::rotating_log::{LogError, RotatingLog};
use crate::runner::{RunnerError, TaskRunner};
use crate::scheduler::{JobScheduler, SchedulerError};
use crate::store::{StoreData, StoreError, TaskStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taskmill_core::{Clock, ProjectReference, TaskDefinition, TaskStatus, TriggerError, TriggerSpec};
use thiserror::Error;

/// Errors surfaced by registry operations. `code` gives the stable
/// machine-readable form callers report instead of raw messages.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("task '{task}' already belongs to project '{existing}', not '{requested}'")]
    TaskConflict {
        task: String,
        existing: String,
        requested: String,
    },
    #[error("cannot resolve a state directory (no HOME)")]
    NoStateDir,
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Log(#[from] LogError),
}

impl RegistryError {
    /// Stable error code for callers that must not expose raw messages.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::TaskNotFound(_) => "task_not_found",
            RegistryError::ProjectNotFound(_) => "project_not_found",
            RegistryError::TaskConflict { .. } => "task_conflict",
            RegistryError::NoStateDir => "no_state_dir",
            RegistryError::Trigger(_) => "invalid_trigger",
            RegistryError::Scheduler(SchedulerError::DuplicateJob(_)) => "duplicate_job",
            RegistryError::Scheduler(SchedulerError::JobNotFound(_)) => "job_not_found",
            RegistryError::Runner(RunnerError::TaskNotRunning(_)) => "task_not_running",
            RegistryError::Runner(RunnerError::AlreadyRunning(_)) => "task_already_running",
            RegistryError::Runner(RunnerError::ProjectMissing { .. }) => "project_missing",
            RegistryError::Runner(RunnerError::Launch { .. }) => "launch_failed",
            RegistryError::Runner(RunnerError::Provisioning(_)) => "provisioning_failed",
            RegistryError::Runner(RunnerError::Log(_)) | RegistryError::Log(_) => "log_io",
            RegistryError::Store(_) => "store_io",
        }
    }
}

/// Tunables for the registry and everything it constructs.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root for the task store and per-task logs.
    pub state_dir: PathBuf,
    pub log_max_bytes: u64,
    pub log_backups: u32,
    pub kill_grace: Duration,
}

impl RegistryConfig {
    /// Configuration rooted at `state_dir` with default limits.
    pub fn at(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            log_max_bytes: env::DEFAULT_LOG_MAX_BYTES,
            log_backups: env::DEFAULT_LOG_BACKUPS,
            kill_grace: env::DEFAULT_KILL_GRACE,
        }
    }

    /// Configuration from the process environment.
    pub fn from_env() -> Result<Self, RegistryError> {
        Ok(Self {
            state_dir: env::state_dir()?,
            log_max_bytes: env::log_max_bytes(),
            log_backups: env::log_backups(),
            kill_grace: env::kill_grace(),
        })
    }
}

struct RegistryState {
    data: StoreData,
    runners: HashMap<String, Arc<TaskRunner>>,
}

/// The task registry. Owns the store, the scheduler, and one runner per
/// registered task.
pub struct TaskRegistry {
    config: RegistryConfig,
    store: TaskStore,
    scheduler: JobScheduler,
    clock: Arc<dyn Clock>,
    provision: Arc<ProvisionCache>,
    state: Mutex<RegistryState>,
}

impl TaskRegistry {
    /// Open the registry: load the persisted store and build the scheduler.
    /// No jobs are registered until [`TaskRegistry::start`].
    pub fn open(
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
        provision: Arc<ProvisionCache>,
    ) -> Result<Self, RegistryError> {
        let store = TaskStore::new(config.state_dir.join("tasks.json"));
        let data = store.load()?;
        let scheduler = JobScheduler::new(Arc::clone(&clock));
        Ok(Self {
            config,
            store,
            scheduler,
            clock,
            provision,
            state: Mutex::new(RegistryState {
                data,
                runners: HashMap::new(),
            }),
        })
    }

    /// Start the dispatch loop and register every persisted task whose
    /// project still resolves on disk. Definitions whose project is gone are
    /// kept in the store but get no job; they fail visibly instead of
    /// silently disappearing.
    pub fn start(&self) -> Result<(), RegistryError> {
        self.scheduler.start();

        let mut st = self.state.lock();
        let defs: Vec<TaskDefinition> = st.data.tasks.values().cloned().collect();
        for def in defs {
            let Some(project) = st.data.projects.get(&def.project).cloned() else {
                tracing::warn!(task = %def.name, project = %def.project, "skipping task: unknown project");
                continue;
            };
            if !project.exists() {
                tracing::warn!(
                    task = %def.name,
                    project = %project.root.display(),
                    "skipping task: project root is gone"
                );
                continue;
            }
            if let Err(e) = self.register(&mut st.runners, &def, &project) {
                tracing::error!(task = %def.name, error = %e, "failed to register persisted task");
            }
        }
        tracing::info!(tasks = st.runners.len(), "registry started");
        Ok(())
    }

    /// Build the runner and scheduler job for one definition. Paused
    /// definitions are registered paused.
    fn register(
        &self,
        runners: &mut HashMap<String, Arc<TaskRunner>>,
        def: &TaskDefinition,
        project: &ProjectReference,
    ) -> Result<(), RegistryError> {
        let trigger = def.trigger.compile()?;
        let log_path = self
            .config
            .state_dir
            .join("logs")
            .join(format!("{}.log", def.name));
        let log = RotatingLog::open(log_path, self.config.log_max_bytes, self.config.log_backups)?;
        let runner = Arc::new(TaskRunner::new(
            def.name.clone(),
            def.command.clone(),
            project.clone(),
            Arc::clone(&self.provision),
            log,
            self.config.kill_grace,
        ));

        let worker = Arc::clone(&runner);
        self.scheduler.add(
            &def.name,
            move || {
                if let Err(e) = worker.run() {
                    tracing::warn!(task = %worker.name(), error = %e, "task run failed");
                }
            },
            trigger,
            Some(1),
        )?;
        if def.is_paused() {
            self.scheduler.pause(&def.name)?;
        }
        runners.insert(def.name.clone(), runner);
        Ok(())
    }

    /// Register or replace a project reference.
    pub fn set_project(&self, name: &str, root: impl Into<PathBuf>) -> Result<(), RegistryError> {
        let now = self.clock.now();
        let mut st = self.state.lock();
        let project = match st.data.projects.get(name) {
            Some(existing) => {
                let mut p = existing.clone();
                p.root = root.into();
                p.updated_at = now;
                p
            }
            None => ProjectReference::new(name, root, now),
        };
        st.data.projects.insert(name.to_string(), project);
        self.store.save(&st.data)?;
        Ok(())
    }

    /// Drop a project reference. Tasks still pointing at it keep their
    /// definitions and start failing at run time.
    pub fn remove_project(&self, name: &str) -> Result<(), RegistryError> {
        let mut st = self.state.lock();
        if st.data.projects.remove(name).is_none() {
            return Err(RegistryError::ProjectNotFound(name.to_string()));
        }
        let dependents: Vec<String> = st
            .data
            .tasks
            .values()
            .filter(|t| t.project == name)
            .map(|t| t.name.clone())
            .collect();
        if !dependents.is_empty() {
            tracing::warn!(project = name, tasks = ?dependents, "removed project still referenced by tasks");
        }
        self.store.save(&st.data)?;
        Ok(())
    }

    /// Upsert a task definition and (re)register its job so the new schedule
    /// takes effect immediately.
    ///
    /// The same name under a different project is a conflict, not an update:
    /// task names are globally unique and silently rebinding one to another
    /// project would hijack its history.
    pub fn set_task(
        &self,
        name: &str,
        project: &str,
        trigger: TriggerSpec,
        command: &str,
    ) -> Result<(), RegistryError> {
        // Validate the trigger before touching any state.
        trigger.compile()?;
        let now = self.clock.now();

        let mut st = self.state.lock();
        let project_ref = st
            .data
            .projects
            .get(project)
            .cloned()
            .ok_or_else(|| RegistryError::ProjectNotFound(project.to_string()))?;

        let def = match st.data.tasks.get(name) {
            Some(existing) => {
                if existing.project != project {
                    return Err(RegistryError::TaskConflict {
                        task: name.to_string(),
                        existing: existing.project.clone(),
                        requested: project.to_string(),
                    });
                }
                let mut def = existing.clone();
                def.trigger = trigger;
                def.command = command.to_string();
                def.updated_at = now;
                def
            }
            None => TaskDefinition::new(name, project, trigger, command, now),
        };

        // Remove-then-add: a fresh job entry picks up the new trigger and
        // command at once.
        if self.scheduler.contains(name) {
            self.scheduler.remove(name)?;
        }
        st.runners.remove(name);
        self.register(&mut st.runners, &def, &project_ref)?;

        st.data.tasks.insert(name.to_string(), def);
        self.store.save(&st.data)?;
        tracing::info!(task = name, project, "task definition saved");
        Ok(())
    }

    /// Remove a task: its job, its runner, its definition, and its log files.
    pub fn remove_task(&self, name: &str) -> Result<(), RegistryError> {
        let mut st = self.state.lock();
        if st.data.tasks.remove(name).is_none() {
            return Err(RegistryError::TaskNotFound(name.to_string()));
        }
        if self.scheduler.contains(name) {
            self.scheduler.remove(name)?;
        }
        if let Some(runner) = st.runners.remove(name) {
            if runner.is_running() {
                if let Err(e) = runner.kill() {
                    tracing::warn!(task = name, error = %e, "failed to stop task during removal");
                }
            }
            if let Err(e) = runner.purge_logs() {
                tracing::warn!(task = name, error = %e, "failed to delete task logs");
            }
        }
        self.store.save(&st.data)?;
        tracing::info!(task = name, "task removed");
        Ok(())
    }

    /// Mark the task Active and let its trigger fire again.
    pub fn start_task(&self, name: &str) -> Result<(), RegistryError> {
        self.set_status(name, TaskStatus::Active)?;
        self.scheduler.resume(name)?;
        Ok(())
    }

    /// Mark the task Paused; the trigger stops firing but the definition and
    /// schedule metadata survive.
    pub fn pause_task(&self, name: &str) -> Result<(), RegistryError> {
        self.set_status(name, TaskStatus::Paused)?;
        self.scheduler.pause(name)?;
        Ok(())
    }

    fn set_status(&self, name: &str, status: TaskStatus) -> Result<(), RegistryError> {
        let now = self.clock.now();
        let mut st = self.state.lock();
        let def = st
            .data
            .tasks
            .get_mut(name)
            .ok_or_else(|| RegistryError::TaskNotFound(name.to_string()))?;
        def.status = status;
        def.updated_at = now;
        self.store.save(&st.data)?;
        Ok(())
    }

    /// Force one execution now. A paused task runs once and stays paused.
    pub async fn run_task(&self, name: &str) -> Result<(), RegistryError> {
        let preserve_pause = {
            let st = self.state.lock();
            st.data
                .tasks
                .get(name)
                .ok_or_else(|| RegistryError::TaskNotFound(name.to_string()))?
                .is_paused()
        };
        self.scheduler.run_now(name, preserve_pause).await?;
        Ok(())
    }

    /// Kill the task's live subprocess, if any.
    pub fn stop_task(&self, name: &str) -> Result<(), RegistryError> {
        let runner = self.runner(name)?;
        runner.kill()?;
        Ok(())
    }

    /// Whether the task currently has a live subprocess.
    pub fn is_running(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.runner(name)?.is_running())
    }

    /// Up to `limit` most-recent log lines for the task, newest first.
    pub fn get_logs(&self, name: &str, limit: usize) -> Result<Vec<String>, RegistryError> {
        Ok(self.runner(name)?.get_logs(limit)?)
    }

    fn runner(&self, name: &str) -> Result<Arc<TaskRunner>, RegistryError> {
        self.state
            .lock()
            .runners
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::TaskNotFound(name.to_string()))
    }

    /// Reconcile definitions, jobs, and projects after manual edits or
    /// crashes:
    /// - a scheduler job with no definition is removed;
    /// - a definition whose project root is gone loses its job (the
    ///   definition itself survives, per the missing-project invariant);
    /// - a definition whose project exists but whose job is gone is dropped
    ///   as stale.
    pub fn sync(&self) -> Result<(), RegistryError> {
        let mut st = self.state.lock();

        for job in self.scheduler.jobs() {
            if !st.data.tasks.contains_key(&job.id) {
                tracing::info!(task = %job.id, "sync: removing job without definition");
                self.scheduler.remove(&job.id)?;
                st.runners.remove(&job.id);
            }
        }

        let mut stale: Vec<String> = Vec::new();
        for def in st.data.tasks.values() {
            let project_alive = st
                .data
                .projects
                .get(&def.project)
                .is_some_and(ProjectReference::exists);
            if !project_alive {
                if self.scheduler.contains(&def.name) {
                    tracing::info!(task = %def.name, "sync: removing job for missing project");
                    self.scheduler.remove(&def.name)?;
                }
            } else if !self.scheduler.contains(&def.name) {
                stale.push(def.name.clone());
            }
        }
        for name in stale {
            tracing::info!(task = %name, "sync: dropping definition without job");
            st.data.tasks.remove(&name);
            st.runners.remove(&name);
        }

        self.store.save(&st.data)?;
        Ok(())
    }

    /// Snapshot of every task definition.
    pub fn list_tasks(&self) -> Vec<TaskDefinition> {
        self.state.lock().data.tasks.values().cloned().collect()
    }

    /// Snapshot of every project reference.
    pub fn list_projects(&self) -> Vec<ProjectReference> {
        self.state.lock().data.projects.values().cloned().collect()
    }

    /// Look up one task definition.
    pub fn task(&self, name: &str) -> Option<TaskDefinition> {
        self.state.lock().data.tasks.get(name).cloned()
    }

    /// The underlying scheduler, for job-level introspection.
    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// Stop the dispatch loop.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
