/// Fetched results controller tests
///
/// Tests for live queries: loading, sectioning, change batches and disposal
/// Run with: cargo test --test fetched_results_tests

use futures::StreamExt;
use memopersist::{
    ControllerState, Entity, FetchedResultsController, IndexPath, Managed, ObjectChange,
    Persistence, PersistenceError, Predicate, SectionChange, SortDescriptor, StoreConfig,
    StoreError, StoreHandle, Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Address {
    city: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Student {
    name: String,
    course: String,
    score: i64,
    address: Address,
    tags: Vec<String>,
}

impl Entity for Student {
    const ENTITY_NAME: &'static str = "student";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Instructor {
    name: String,
}

impl Entity for Instructor {
    const ENTITY_NAME: &'static str = "instructor";
}

fn open(name: &str) -> StoreHandle {
    StoreHandle::open(StoreConfig::in_memory(name)).unwrap()
}

fn add(p: &mut Persistence, name: &str, course: &str, score: i64) -> Managed<Student> {
    let mut student = p.insert::<Student>().unwrap();
    student.name = name.to_string();
    student.course = course.to_string();
    student.score = score;
    p.add_or_update(&student).unwrap();
    student
}

fn by_course(p: &Persistence) -> FetchedResultsController<Student> {
    let mut controller = p
        .fetched_results_controller::<Student>(
            Predicate::all(),
            vec![SortDescriptor::ascending("score")],
            Some("course"),
        )
        .unwrap();
    controller.perform_fetch().unwrap();
    controller
}

#[test]
fn test_sectioned_initial_fetch() {
    let store = open("sections");
    let mut persistence = store.persistence().unwrap();
    add(&mut persistence, "m2", "Math", 2);
    add(&mut persistence, "art", "Art", 5);
    add(&mut persistence, "m1", "Math", 1);
    persistence.save().unwrap();

    let controller = by_course(&persistence);
    assert_eq!(controller.state(), ControllerState::Loaded);
    assert_eq!(controller.number_of_sections(), 2);

    let sections = controller.sections();
    assert_eq!(sections[0].name, Some(Value::from("Art")));
    assert_eq!(sections[0].number_of_objects, 1);
    assert_eq!(sections[1].name, Some(Value::from("Math")));
    assert_eq!(controller.number_of_objects(1), 2);

    let first_math = controller.object_at(IndexPath::new(1, 0)).unwrap().unwrap();
    let second_math = controller.object_at(IndexPath::new(1, 1)).unwrap().unwrap();
    assert_eq!(first_math.score, 1);
    assert_eq!(second_math.score, 2);
    assert_eq!(
        controller.index_path_of(&first_math),
        Some(IndexPath::new(1, 0))
    );
    assert!(controller.object_at(IndexPath::new(2, 0)).unwrap().is_none());

    let names: Vec<String> = controller
        .fetched_objects()
        .unwrap()
        .into_iter()
        .map(|s| s.name.clone())
        .collect();
    assert_eq!(names, vec!["art", "m1", "m2"]);
}

#[test]
fn test_unsectioned_empty_results() {
    let store = open("empty");
    let persistence = store.persistence().unwrap();
    let mut controller = persistence
        .fetched_results_controller::<Student>(Predicate::all(), vec![], None)
        .unwrap();

    assert_eq!(controller.state(), ControllerState::Unloaded);
    controller.perform_fetch().unwrap();
    assert_eq!(controller.number_of_sections(), 1);
    assert_eq!(controller.number_of_objects(0), 0);
    assert_eq!(controller.sections()[0].name, None);
}

#[test]
fn test_invalid_section_key_paths() {
    let store = open("keys");
    let persistence = store.persistence().unwrap();

    for key in ["address", "tags", "nickname", ""] {
        let result =
            persistence.fetched_results_controller::<Student>(Predicate::all(), vec![], Some(key));
        assert_eq!(
            result.unwrap_err(),
            PersistenceError::InvalidSectionNameKeyPath,
            "key path {:?}",
            key
        );
    }

    assert!(
        persistence
            .fetched_results_controller::<Student>(Predicate::all(), vec![], Some("address.city"))
            .is_ok()
    );
}

#[test]
fn test_external_insert_and_unmatching_update() {
    let store = open("diffs");
    let mut writer = store.persistence().unwrap();
    let alice = add(&mut writer, "Alice", "Math", 7);
    writer.save().unwrap();

    let reader = store.persistence().unwrap();
    let mut controller = reader
        .fetched_results_controller::<Student>(
            Predicate::ge("score", 5),
            vec![SortDescriptor::ascending("score")],
            None,
        )
        .unwrap();
    controller.perform_fetch().unwrap();
    let mut stream = controller.subscribe().unwrap();

    let bob = add(&mut writer, "Bob", "Art", 9);
    writer.save().unwrap();

    let batch = stream.try_next_batch().unwrap();
    assert!(batch.section_changes.is_empty());
    assert_eq!(
        batch.changes,
        vec![ObjectChange::Insert {
            id: bob.id(),
            at: IndexPath::new(0, 1),
        }]
    );

    let mut failing = alice.clone();
    failing.score = 1;
    writer.add_or_update(&failing).unwrap();
    writer.save().unwrap();

    let batch = stream.try_next_batch().unwrap();
    assert_eq!(
        batch.changes,
        vec![ObjectChange::Delete {
            id: alice.id(),
            at: IndexPath::new(0, 0),
        }]
    );
    assert!(stream.try_next_batch().is_none());
    assert_eq!(controller.number_of_objects(0), 1);
}

#[test]
fn test_update_and_move() {
    let store = open("moves");
    let mut writer = store.persistence().unwrap();
    let m1 = add(&mut writer, "m1", "Math", 1);
    let m2 = add(&mut writer, "m2", "Math", 2);
    let art = add(&mut writer, "art", "Art", 5);
    writer.save().unwrap();

    let controller = by_course(&writer);
    let mut stream = controller.subscribe().unwrap();

    // Field change without reordering
    let mut renamed = m2.clone();
    renamed.name = "m2b".into();
    writer.add_or_update(&renamed).unwrap();
    writer.save().unwrap();
    let batch = stream.try_next_batch().unwrap();
    assert_eq!(
        batch.changes,
        vec![ObjectChange::Update {
            id: m2.id(),
            at: IndexPath::new(1, 1),
        }]
    );

    // Reordering inside a section is a move, even with changed fields
    let mut promoted = m1.clone();
    promoted.score = 3;
    writer.add_or_update(&promoted).unwrap();
    writer.save().unwrap();
    let batch = stream.try_next_batch().unwrap();
    assert_eq!(
        batch.changes,
        vec![ObjectChange::Move {
            id: m1.id(),
            from: IndexPath::new(1, 0),
            to: IndexPath::new(1, 1),
        }]
    );
    assert_eq!(
        controller
            .object_at(IndexPath::new(1, 1))
            .unwrap()
            .unwrap()
            .score,
        3
    );

    // Leaving the last Art entry removes its section
    let mut transferred = art.clone();
    transferred.course = "Math".into();
    transferred.score = 0;
    writer.add_or_update(&transferred).unwrap();
    writer.save().unwrap();
    let batch = stream.try_next_batch().unwrap();
    assert_eq!(batch.section_changes, vec![SectionChange::Delete(0)]);
    assert_eq!(
        batch.changes,
        vec![ObjectChange::Move {
            id: art.id(),
            from: IndexPath::new(0, 0),
            to: IndexPath::new(0, 0),
        }]
    );
    assert_eq!(controller.number_of_sections(), 1);
    assert_eq!(controller.number_of_objects(0), 3);
}

#[test]
fn test_new_section_and_batch_order() {
    let store = open("batch_order");
    let mut writer = store.persistence().unwrap();
    let math = add(&mut writer, "m", "Math", 1);
    writer.save().unwrap();

    let controller = by_course(&writer);
    let mut stream = controller.subscribe().unwrap();

    writer
        .perform(|p| {
            p.delete(&math)?;
            add(p, "a", "Art", 4);
            add(p, "b", "Bio", 2);
            Ok::<_, PersistenceError>(())
        })
        .unwrap();

    let batch = stream.try_next_batch().unwrap();
    assert_eq!(
        batch.section_changes,
        vec![
            SectionChange::Delete(0),
            SectionChange::Insert(0),
            SectionChange::Insert(1),
        ]
    );
    assert_eq!(batch.deletes().count(), 1);
    assert_eq!(batch.inserts().count(), 2);
    assert!(matches!(batch.changes[0], ObjectChange::Delete { .. }));
    assert_eq!(batch.version, store.snapshot().unwrap().version());
}

#[test]
fn test_unrelated_commits_are_silent() {
    let store = open("silent");
    let mut writer = store.persistence().unwrap();
    add(&mut writer, "Alice", "Math", 7);
    writer.save().unwrap();

    let mut controller = writer
        .fetched_results_controller::<Student>(Predicate::eq("course", "Art"), vec![], None)
        .unwrap();
    controller.perform_fetch().unwrap();
    let mut stream = controller.subscribe().unwrap();

    writer.insert::<Instructor>().unwrap();
    add(&mut writer, "Bob", "Math", 3);
    writer.save().unwrap();

    assert!(stream.try_next_batch().is_none());
}

#[test]
fn test_clear_all_records_deletes_everything() {
    let store = open("clear");
    let mut writer = store.persistence().unwrap();
    add(&mut writer, "a", "Math", 1);
    add(&mut writer, "b", "Math", 2);
    writer.save().unwrap();

    let controller = by_course(&writer);
    let mut stream = controller.subscribe().unwrap();
    writer.clear_all_records().unwrap();

    let batch = stream.try_next_batch().unwrap();
    assert_eq!(batch.section_changes, vec![SectionChange::Delete(0)]);
    assert_eq!(batch.deletes().count(), 2);
    assert_eq!(controller.number_of_sections(), 0);
}

#[test]
fn test_dispose_stops_notifications() {
    let store = open("dispose");
    let mut writer = store.persistence().unwrap();

    let mut controller = writer
        .fetched_results_controller::<Student>(Predicate::all(), vec![], None)
        .unwrap();
    controller.perform_fetch().unwrap();
    let mut stream = controller.subscribe().unwrap();

    controller.dispose();
    controller.dispose();
    assert_eq!(controller.state(), ControllerState::Disposed);

    add(&mut writer, "late", "Math", 1);
    writer.save().unwrap();

    assert!(stream.try_next_batch().is_none());
    assert!(tokio_test::block_on(stream.next_batch()).is_none());

    assert_eq!(
        controller.perform_fetch().unwrap_err(),
        PersistenceError::Store(StoreError::Disposed)
    );
    assert!(controller.subscribe().is_err());
}

#[test]
fn test_dispose_while_another_thread_commits() {
    let store = open("dispose_race");
    let persistence = store.persistence().unwrap();
    let mut controller = persistence
        .fetched_results_controller::<Student>(Predicate::all(), vec![], None)
        .unwrap();
    controller.perform_fetch().unwrap();
    let mut stream = controller.subscribe().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let writer = {
        let store = store.clone();
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut writer = store.persistence().unwrap();
            let mut score = 0;
            while running.load(Ordering::SeqCst) {
                add(&mut writer, "w", "Math", score);
                writer.save().unwrap();
                score += 1;
            }
        })
    };

    // Wait until batches are flowing, then dispose mid-stream
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut delivered = 0;
    while delivered < 3 && Instant::now() < deadline {
        match stream.try_next_batch() {
            Some(_) => delivered += 1,
            None => thread::yield_now(),
        }
    }
    assert_eq!(delivered, 3);

    controller.dispose();
    let disposed_at = store.snapshot().unwrap().version();

    while store.snapshot().unwrap().version() < disposed_at + 20 && Instant::now() < deadline {
        thread::yield_now();
    }
    running.store(false, Ordering::SeqCst);
    writer.join().unwrap();
    assert!(store.snapshot().unwrap().version() > disposed_at);

    let late: Vec<_> = stream
        .drain()
        .into_iter()
        .filter(|batch| batch.version > disposed_at)
        .collect();
    assert!(late.is_empty());
    assert!(tokio_test::block_on(stream.next_batch()).is_none());
}

#[test]
fn test_perform_fetch_is_idempotent() {
    let store = open("idempotent");
    let mut writer = store.persistence().unwrap();
    let mut controller = writer
        .fetched_results_controller::<Student>(Predicate::all(), vec![], None)
        .unwrap();
    controller.perform_fetch().unwrap();
    controller.perform_fetch().unwrap();
    let mut stream = controller.subscribe().unwrap();

    add(&mut writer, "once", "Math", 1);
    writer.save().unwrap();

    assert_eq!(stream.drain().len(), 1);
}

#[tokio::test]
async fn test_stream_from_background_writer() {
    let store = open("async_stream");
    let persistence = store.persistence().unwrap();
    let mut controller = persistence
        .fetched_results_controller::<Student>(
            Predicate::parse("course = 'Math'").unwrap(),
            vec![SortDescriptor::descending("score")],
            None,
        )
        .unwrap();
    controller.perform_fetch().unwrap();
    let mut stream = controller.subscribe().unwrap();

    Persistence::background_task(&store, |p| {
        add(p, "x", "Math", 10);
        add(p, "y", "Art", 20);
        Ok(())
    })
    .await
    .unwrap();

    let batch = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.inserts().count(), 1);
    assert_eq!(controller.number_of_objects(0), 1);

    drop(controller);
    assert!(stream.next().await.is_none());
}
