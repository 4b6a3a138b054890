//! Log retention: bounded rotation, newest-first reads, and cleanup when a
//! task is removed.

use crate::prelude::*;
use taskmill_engine::RotatingLog;
use tempfile::tempdir;

#[test]
fn five_writes_yield_exactly_active_and_two_backups() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("task.log");
    let mut log = RotatingLog::open(&path, 100, 2).unwrap();

    // 40 bytes per line, newline included.
    let chunk = |i: usize| format!("chunk-{i}-{}\n", "x".repeat(31));
    assert_eq!(chunk(0).len(), 40);

    for i in 0..5 {
        log.write(&chunk(i)).unwrap();
    }
    log.close().unwrap();

    let file_set = || {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    };
    assert_eq!(file_set(), vec!["task.1.log", "task.2.log", "task.log"]);

    // Two more writes force another rotation; the oldest content falls off
    // the end and the file set never grows.
    for i in 5..7 {
        log.write(&chunk(i)).unwrap();
    }
    log.close().unwrap();
    assert_eq!(file_set(), vec!["task.1.log", "task.2.log", "task.log"]);

    let all: String = ["task.log", "task.1.log", "task.2.log"]
        .iter()
        .map(|n| std::fs::read_to_string(dir.path().join(n)).unwrap())
        .collect();
    assert!(!all.contains("chunk-0"));
    assert!(!all.contains("chunk-1"));
    assert!(all.contains("chunk-6"));
}

#[test]
fn readlines_is_newest_first_and_bounded() {
    let dir = tempdir().unwrap();
    let mut log = RotatingLog::open(dir.path().join("task.log"), 120, 3).unwrap();
    for i in 0..20 {
        log.write(&format!("line-{i:02}\n")).unwrap();
    }

    let lines = log.readlines(5).unwrap();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "line-19");
    assert_eq!(lines[4], "line-15");

    let all = log.readlines(1000).unwrap();
    assert!(all.len() <= 1000);
    let mut seen = all.clone();
    seen.reverse();
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "not newest-first: {all:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn task_output_is_retrievable_newest_first() {
    let mill = Mill::new();
    mill.add_task("chatty", 3600, "echo first; echo second; echo third");
    mill.registry.run_task("chatty").await.unwrap();
    assert!(wait_until(|| mill.logged("chatty", "third")).await);

    let lines = mill.registry.get_logs("chatty", 2).unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("third"));
    assert!(lines[1].contains("second"));
}

#[tokio::test(flavor = "multi_thread")]
async fn removing_a_task_deletes_its_log_files() {
    let mill = Mill::new();
    mill.add_task("tidy", 3600, "echo bye");
    mill.registry.run_task("tidy").await.unwrap();
    assert!(wait_until(|| mill.log_path("tidy").exists()).await);

    mill.registry.remove_task("tidy").unwrap();
    assert!(!mill.log_path("tidy").exists());
    assert!(mill.registry.get_logs("tidy", 5).is_err());
}
