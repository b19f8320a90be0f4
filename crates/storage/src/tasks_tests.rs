// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use tf_core::{Task, TaskPhase};

fn task(n: u64) -> Task {
    let mut t = Task::new(TaskId::numbered(n), format!("task {}", n), Utc::now());
    t.acceptance_criteria = vec!["works".into()];
    t
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskDir::new(dir.path());

    let mut t = task(1);
    t.phase = TaskPhase::Ready;
    t.description = "multi\nline\ndescription".into();
    store.save(&t).unwrap();

    let loaded = store.load(&t.id).unwrap();
    assert_eq!(loaded, t);
}

#[test]
fn load_missing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskDir::new(dir.path());
    assert!(matches!(
        store.load(&TaskId::numbered(9)),
        Err(StorageError::NotFound(_))
    ));
}

#[test]
fn load_all_collects_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskDir::new(dir.path());
    store.save(&task(1)).unwrap();
    store.save(&task(2)).unwrap();
    store.save(&task(3)).unwrap();

    let mut all = store.load_all().unwrap();
    all.sort_by_key(|t| t.id.numeric_suffix());
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].id.as_str(), "TF-3");
}

#[test]
fn load_all_skips_corrupt_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskDir::new(dir.path());
    store.save(&task(1)).unwrap();

    let bad_dir = dir.path().join("tasks/TF-2");
    std::fs::create_dir_all(&bad_dir).unwrap();
    std::fs::write(bad_dir.join("task.yaml"), "{not yaml: [").unwrap();

    let all = store.load_all().unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn delete_removes_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskDir::new(dir.path());
    let t = task(1);
    store.save(&t).unwrap();

    store.delete(&t.id).unwrap();
    assert!(!store.dir(&t.id).exists());
    assert!(matches!(
        store.delete(&t.id),
        Err(StorageError::NotFound(_))
    ));
}

#[test]
fn max_numeric_suffix_over_existing_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskDir::new(dir.path());
    assert_eq!(store.max_numeric_suffix().unwrap(), 0);

    store.save(&task(4)).unwrap();
    store.save(&task(11)).unwrap();
    assert_eq!(store.max_numeric_suffix().unwrap(), 11);
}

#[test]
fn summary_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskDir::new(dir.path());
    let t = task(1);
    store.save(&t).unwrap();

    assert_eq!(store.load_summary(&t.id).unwrap(), None);
    store.save_summary(&t.id, "# Summary\nall good\n").unwrap();
    assert_eq!(
        store.load_summary(&t.id).unwrap().as_deref(),
        Some("# Summary\nall good\n")
    );
}
