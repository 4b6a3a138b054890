// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job scheduling: a min-heap of `(next_fire, job_id)` driven by a single
//! dispatch loop.
//!
//! The loop sleeps until the nearest deadline and is woken by a `Notify`
//! whenever the job set changes. Due jobs are dispatched onto blocking
//! worker slots; each job enforces its own `max_instances` cap (overlapping
//! fires are skipped, not queued). A callback that panics is caught at the
//! dispatch boundary and logged; it never unregisters the job or crashes
//! the loop.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskmill_core::{Clock, Trigger};
use thiserror::Error;
use tokio::sync::{oneshot, Notify};

/// Sleep horizon when no job has a pending fire.
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// Scheduler-level errors, keyed by job id.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job already exists: {0}")]
    DuplicateJob(String),
    #[error("job not found: {0}")]
    JobNotFound(String),
}

/// Callback invoked when a job fires. Runs on a blocking worker slot and may
/// block for the whole subprocess lifetime.
pub type JobCallback = Arc<dyn Fn() + Send + Sync>;

struct JobEntry {
    trigger: Trigger,
    callback: JobCallback,
    paused: bool,
    max_instances: Option<u32>,
    /// Live executions of this job, shared with dispatched workers.
    running: Arc<AtomicU32>,
    /// The fire time currently queued in the heap. Heap entries whose time
    /// no longer matches are stale and dropped lazily on pop.
    next_fire: Option<DateTime<Utc>>,
}

/// Read-only snapshot of a registered job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: String,
    pub trigger: Trigger,
    pub paused: bool,
    pub next_fire: Option<DateTime<Utc>>,
}

struct ManualRun {
    job_id: String,
    preserve_pause: bool,
    ack: oneshot::Sender<Result<(), SchedulerError>>,
}

#[derive(Default)]
struct SchedulerState {
    jobs: HashMap<String, JobEntry>,
    queue: BinaryHeap<Reverse<(DateTime<Utc>, String)>>,
    manual: VecDeque<ManualRun>,
    shutdown: bool,
}

/// The job scheduler. Cheap to clone handles via `Arc`; all mutation goes
/// through the internal mutex, and the dispatch loop runs as one background
/// tokio task started by [`JobScheduler::start`].
pub struct JobScheduler {
    state: Arc<Mutex<SchedulerState>>,
    notify: Arc<Notify>,
    clock: Arc<dyn Clock>,
}

impl JobScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            notify: Arc::new(Notify::new()),
            clock,
        }
    }

    /// Spawn the dispatch loop. Call once; the loop runs until
    /// [`JobScheduler::shutdown`].
    pub fn start(&self) {
        let state = Arc::clone(&self.state);
        let notify = Arc::clone(&self.notify);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(dispatch_loop(state, notify, clock));
    }

    /// Register a job. `max_instances` of `None` means no concurrency cap;
    /// callers that want the at-most-one-run invariant pass `Some(1)`.
    pub fn add(
        &self,
        job_id: &str,
        callback: impl Fn() + Send + Sync + 'static,
        trigger: Trigger,
        max_instances: Option<u32>,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if state.jobs.contains_key(job_id) {
            return Err(SchedulerError::DuplicateJob(job_id.to_string()));
        }
        let next_fire = trigger.next_fire_after(self.clock.now());
        if let Some(at) = next_fire {
            state.queue.push(Reverse((at, job_id.to_string())));
        }
        state.jobs.insert(
            job_id.to_string(),
            JobEntry {
                trigger,
                callback: Arc::new(callback),
                paused: false,
                max_instances,
                running: Arc::new(AtomicU32::new(0)),
                next_fire,
            },
        );
        drop(state);
        tracing::info!(job_id, "job added");
        self.notify.notify_one();
        Ok(())
    }

    /// Unregister a job. Stale heap entries are dropped lazily by the loop.
    pub fn remove(&self, job_id: &str) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if state.jobs.remove(job_id).is_none() {
            return Err(SchedulerError::JobNotFound(job_id.to_string()));
        }
        drop(state);
        tracing::info!(job_id, "job removed");
        self.notify.notify_one();
        Ok(())
    }

    /// Stop the trigger from firing. Schedule metadata is retained; the next
    /// fire is recomputed on resume.
    pub fn pause(&self, job_id: &str) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        let entry = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
        entry.paused = true;
        entry.next_fire = None;
        drop(state);
        tracing::info!(job_id, "job paused");
        Ok(())
    }

    /// Allow the trigger to fire again, scheduling from now.
    pub fn resume(&self, job_id: &str) -> Result<(), SchedulerError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let entry = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
        if entry.paused {
            entry.paused = false;
            let next_fire = entry.trigger.next_fire_after(now);
            entry.next_fire = next_fire;
            if let Some(at) = next_fire {
                state.queue.push(Reverse((at, job_id.to_string())));
            }
        }
        drop(state);
        tracing::info!(job_id, "job resumed");
        self.notify.notify_one();
        Ok(())
    }

    /// Force one execution ahead of the next scheduled fire without
    /// disturbing the regular cadence.
    ///
    /// The returned future resolves once the loop has dispatched the manual
    /// run. For a paused job, `preserve_pause = true` leaves the job paused
    /// (guaranteed by the dispatch acknowledgment, not a delay); with
    /// `preserve_pause = false` the job is also resumed.
    pub async fn run_now(&self, job_id: &str, preserve_pause: bool) -> Result<(), SchedulerError> {
        let rx = {
            let mut state = self.state.lock();
            if !state.jobs.contains_key(job_id) {
                return Err(SchedulerError::JobNotFound(job_id.to_string()));
            }
            let (tx, rx) = oneshot::channel();
            state.manual.push_back(ManualRun {
                job_id: job_id.to_string(),
                preserve_pause,
                ack: tx,
            });
            rx
        };
        self.notify.notify_one();
        rx.await
            .unwrap_or_else(|_| Err(SchedulerError::JobNotFound(job_id.to_string())))
    }

    /// Snapshot of all registered jobs.
    pub fn jobs(&self) -> Vec<JobInfo> {
        let state = self.state.lock();
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .iter()
            .map(|(id, entry)| JobInfo {
                id: id.clone(),
                trigger: entry.trigger.clone(),
                paused: entry.paused,
                next_fire: entry.next_fire,
            })
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Whether a job id is registered.
    pub fn contains(&self, job_id: &str) -> bool {
        self.state.lock().jobs.contains_key(job_id)
    }

    /// Stop the dispatch loop. Jobs already dispatched run to completion;
    /// nothing new fires.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.notify.notify_one();
    }
}

/// A fire ready to hand to a worker slot, extracted under the state lock.
struct Dispatch {
    job_id: String,
    callback: JobCallback,
    running: Arc<AtomicU32>,
    max_instances: Option<u32>,
}

async fn dispatch_loop(
    state: Arc<Mutex<SchedulerState>>,
    notify: Arc<Notify>,
    clock: Arc<dyn Clock>,
) {
    tracing::debug!("scheduler dispatch loop started");
    loop {
        let mut dispatches: Vec<Dispatch> = Vec::new();
        let mut acks: Vec<(oneshot::Sender<Result<(), SchedulerError>>, Result<(), SchedulerError>)> =
            Vec::new();

        let wait = {
            let mut st = state.lock();
            if st.shutdown {
                break;
            }
            let now = clock.now();

            // Manual runs first: they fire regardless of pause state.
            while let Some(run) = st.manual.pop_front() {
                let Some(entry) = st.jobs.get_mut(&run.job_id) else {
                    let id = run.job_id.clone();
                    acks.push((run.ack, Err(SchedulerError::JobNotFound(id))));
                    continue;
                };
                dispatches.push(Dispatch {
                    job_id: run.job_id.clone(),
                    callback: Arc::clone(&entry.callback),
                    running: Arc::clone(&entry.running),
                    max_instances: entry.max_instances,
                });
                let mut reschedule = None;
                if entry.paused && !run.preserve_pause {
                    entry.paused = false;
                    let next_fire = entry.trigger.next_fire_after(now);
                    entry.next_fire = next_fire;
                    reschedule = next_fire;
                }
                if let Some(at) = reschedule {
                    st.queue.push(Reverse((at, run.job_id.clone())));
                }
                acks.push((run.ack, Ok(())));
            }

            // Scheduled fires that are due, dropping stale heap entries.
            loop {
                let due = matches!(st.queue.peek(), Some(Reverse((at, _))) if *at <= now);
                if !due {
                    break;
                }
                let Some(Reverse((at, job_id))) = st.queue.pop() else {
                    break;
                };
                let Some(entry) = st.jobs.get_mut(&job_id) else {
                    continue; // removed; stale entry
                };
                if entry.paused || entry.next_fire != Some(at) {
                    continue; // paused or rescheduled; stale entry
                }
                dispatches.push(Dispatch {
                    job_id: job_id.clone(),
                    callback: Arc::clone(&entry.callback),
                    running: Arc::clone(&entry.running),
                    max_instances: entry.max_instances,
                });
                let next_fire = entry.trigger.next_fire_after(now);
                entry.next_fire = next_fire;
                if let Some(next) = next_fire {
                    st.queue.push(Reverse((next, job_id)));
                } else {
                    tracing::info!(job_id = %job_id, "trigger exhausted; job will not fire again");
                }
            }

            // Nearest valid deadline decides how long to sleep.
            next_deadline(&mut st)
                .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(IDLE_WAIT)
        };

        for (ack, result) in acks {
            let _ = ack.send(result);
        }
        for dispatch in dispatches {
            fire(dispatch);
        }

        tokio::select! {
            _ = notify.notified() => {}
            _ = tokio::time::sleep(wait) => {}
        }
    }
    tracing::debug!("scheduler dispatch loop stopped");
}

/// Earliest heap deadline that still corresponds to a live, unpaused job.
fn next_deadline(st: &mut SchedulerState) -> Option<DateTime<Utc>> {
    while let Some(Reverse((at, job_id))) = st.queue.peek() {
        let valid = st
            .jobs
            .get(job_id)
            .is_some_and(|e| !e.paused && e.next_fire == Some(*at));
        if valid {
            return Some(*at);
        }
        st.queue.pop();
    }
    None
}

/// Hand one fire to a blocking worker slot, honoring the per-job cap.
fn fire(dispatch: Dispatch) {
    if let Some(cap) = dispatch.max_instances {
        if dispatch.running.load(Ordering::SeqCst) >= cap {
            tracing::warn!(
                job_id = %dispatch.job_id,
                cap,
                "skipping fire: max instances reached"
            );
            return;
        }
    }
    dispatch.running.fetch_add(1, Ordering::SeqCst);
    let job_id = dispatch.job_id;
    let callback = dispatch.callback;
    let running = dispatch.running;
    tokio::spawn(async move {
        tracing::debug!(job_id = %job_id, "dispatching job");
        let result = tokio::task::spawn_blocking(move || callback()).await;
        if let Err(e) = result {
            // Panic inside the callback. Log it; the job stays registered.
            tracing::error!(job_id = %job_id, error = %e, "job callback panicked");
        }
        running.fetch_sub(1, Ordering::SeqCst);
    });
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
