/// Durability tests
///
/// Tests for snapshot-file stores: restore on open and init failures
/// Run with: cargo test --test durability_tests

use memopersist::{
    DurabilityMode, Entity, PersistenceError, Predicate, SortDescriptor, StoreConfig, StoreHandle,
};
use serde::{Deserialize, Serialize};
use std::fs;
use tempfile::TempDir;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Note {
    title: String,
    rank: i64,
}

impl Entity for Note {
    const ENTITY_NAME: &'static str = "note";
}

#[test]
fn test_reopen_restores_committed_state() {
    let dir = TempDir::new().unwrap();

    {
        let store = StoreHandle::open(StoreConfig::file("notes", dir.path())).unwrap();
        let mut persistence = store.persistence().unwrap();
        for (title, rank) in [("b", 2), ("a", 1), ("c", 3)] {
            let mut note = persistence.insert::<Note>().unwrap();
            note.title = title.to_string();
            note.rank = rank;
            persistence.add_or_update(&note).unwrap();
        }
        persistence.save().unwrap();

        // Uncommitted work is not written
        persistence.insert::<Note>().unwrap();
        store.close();
    }

    assert!(dir.path().join("notes.snapshot").exists());

    let store = StoreHandle::open(StoreConfig::file("notes", dir.path())).unwrap();
    let mut persistence = store.persistence().unwrap();
    let notes = persistence.fetch_all::<Note>().unwrap();
    let titles: Vec<&str> = notes.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["b", "a", "c"]);

    let by_rank = persistence
        .fetch::<Note>(Predicate::all(), &[SortDescriptor::ascending("rank")])
        .unwrap();
    assert_eq!(by_rank[0].title, "a");

    // New inserts continue after the restored store order
    let mut newest = persistence.insert::<Note>().unwrap();
    newest.title = "d".into();
    persistence.add_or_update(&newest).unwrap();
    persistence.save().unwrap();
    let notes = persistence.fetch_all::<Note>().unwrap();
    assert_eq!(notes.last().map(|n| n.title.as_str()), Some("d"));
}

#[test]
fn test_clear_is_persisted() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::file("cleared", dir.path());

    let store = StoreHandle::open(config.clone()).unwrap();
    let mut persistence = store.persistence().unwrap();
    persistence.insert::<Note>().unwrap();
    persistence.save().unwrap();
    persistence.clear_all_records().unwrap();
    store.close();

    let store = StoreHandle::open(config).unwrap();
    assert!(store.snapshot().unwrap().is_empty());
}

#[test]
fn test_durability_none_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::file("volatile", dir.path()).durability(DurabilityMode::None);

    let store = StoreHandle::open(config).unwrap();
    let mut persistence = store.persistence().unwrap();
    persistence.insert::<Note>().unwrap();
    persistence.save().unwrap();

    assert!(!dir.path().join("volatile.snapshot").exists());
}

#[test]
fn test_corrupt_snapshot_fails_to_init() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.snapshot"), b"\xc1garbage").unwrap();

    let result = StoreHandle::open(StoreConfig::file("broken", dir.path()));
    assert_eq!(result.unwrap_err(), PersistenceError::FailureToInit);
}

#[test]
fn test_unusable_directory_fails_to_init() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("not_a_dir");
    fs::write(&file, b"").unwrap();

    let result = StoreHandle::open(StoreConfig::file("notes", &file));
    assert_eq!(result.unwrap_err(), PersistenceError::FailureToInit);
}
