//! Scheduler cadence: manual runs fire once, immediately, and never shift
//! the natural schedule.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskmill_core::{SystemClock, Trigger};
use taskmill_engine::{JobScheduler, SchedulerError};

fn scheduler() -> JobScheduler {
    let sched = JobScheduler::new(Arc::new(SystemClock));
    sched.start();
    sched
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_run_fires_once_and_keeps_the_original_schedule() {
    let sched = scheduler();
    let count = Arc::new(AtomicUsize::new(0));
    let cb = Arc::clone(&count);
    sched
        .add(
            "j1",
            move || {
                cb.fetch_add(1, Ordering::SeqCst);
            },
            Trigger::every(Duration::from_secs(10)),
            Some(1),
        )
        .unwrap();
    let planned = sched.jobs().remove(0).next_fire.unwrap();

    sched.run_now("j1", false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(count.load(Ordering::SeqCst), 1, "exactly one execution");
    // The next natural fire is still ~10s after the original registration,
    // not 10s after the manual run.
    assert_eq!(sched.jobs().remove(0).next_fire, Some(planned));
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_run_on_paused_job_leaves_it_paused() {
    let sched = scheduler();
    let count = Arc::new(AtomicUsize::new(0));
    let cb = Arc::clone(&count);
    sched
        .add(
            "j1",
            move || {
                cb.fetch_add(1, Ordering::SeqCst);
            },
            Trigger::every(Duration::from_millis(50)),
            Some(1),
        )
        .unwrap();
    sched.pause("j1").unwrap();

    sched.run_now("j1", true).await.unwrap();
    // Paused again (here: never unpaused) as soon as the ack resolves.
    assert!(sched.jobs().remove(0).paused);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_and_unknown_ids_are_rejected() {
    let sched = scheduler();
    sched
        .add("j1", || {}, Trigger::every(Duration::from_secs(60)), Some(1))
        .unwrap();

    assert!(matches!(
        sched.add("j1", || {}, Trigger::every(Duration::from_secs(60)), Some(1)),
        Err(SchedulerError::DuplicateJob(_))
    ));
    assert!(matches!(
        sched.remove("nope"),
        Err(SchedulerError::JobNotFound(_))
    ));
    assert!(matches!(
        sched.run_now("nope", false).await,
        Err(SchedulerError::JobNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn cron_jobs_schedule_a_future_fire() {
    let sched = scheduler();
    sched
        .add("daily", || {}, Trigger::cron("0 3 * * *").unwrap(), Some(1))
        .unwrap();
    let job = sched.jobs().remove(0);
    assert!(job.next_fire.is_some());
    assert!(!job.paused);
}
