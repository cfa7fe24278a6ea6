//! Index lookup and range scan tests

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{json, Value};
use tabula_core::{
    BoundDescriptor, BoundMode, Callbacks, ConnectionManager, Database, DatabaseConfig, Error,
    FieldDefinition, HostScheduler, Key, MemoryBackend, RecordHandle, TableDefinition,
};

/// Scheduler that records how many deliveries went through the host cycle
#[derive(Clone, Default)]
struct Cycle {
    runs: Rc<Cell<usize>>,
}

impl HostScheduler for Cycle {
    fn apply(&self, task: Box<dyn FnOnce()>) {
        self.runs.set(self.runs.get() + 1);
        task()
    }
}

async fn open_with(mode: BoundMode, cycle: Cycle) -> Database<MemoryBackend> {
    let config = DatabaseConfig::builder()
        .tables(&[TableDefinition::new("people")
            .field(FieldDefinition::new("name"))
            .field(FieldDefinition::new("age"))])
        .unwrap()
        .bound_mode(mode)
        .build();

    let db = ConnectionManager::new(MemoryBackend::new(), config)
        .with_scheduler(cycle)
        .initialize()
        .await
        .unwrap();

    let people = db.handle("people").unwrap();
    for (name, age) in [("bo", 40), ("al", 30), ("cy", 30), ("di", 25)] {
        people.create(json!({"name": name, "age": age})).await.unwrap();
    }
    db
}

async fn people() -> RecordHandle<MemoryBackend> {
    open_with(BoundMode::Independent, Cycle::default())
        .await
        .handle("people")
        .unwrap()
}

fn names(records: &[Value]) -> Vec<&str> {
    records.iter().filter_map(|r| r["name"].as_str()).collect()
}

#[tokio::test]
async fn test_find_by_index() {
    let people = people().await;
    let found = people.find_by_index("name", "cy").await.unwrap().unwrap();
    assert_eq!(found["age"], 30);

    assert_eq!(people.find_by_index("name", "zed").await.unwrap(), None);
}

#[tokio::test]
async fn test_find_by_index_returns_lowest_primary_key_on_ties() {
    let people = people().await;
    let found = people.find_by_index("age", 30).await.unwrap().unwrap();
    assert_eq!(found["name"], "al");
}

#[tokio::test]
async fn test_empty_index_name_is_argument_error() {
    let people = people().await;
    assert!(matches!(
        people.find_by_index("", 1).await,
        Err(Error::Argument(_))
    ));
    assert!(matches!(
        people.get_by_index("", &BoundDescriptor::all()).await,
        Err(Error::Argument(_))
    ));
}

#[tokio::test]
async fn test_only_scan() {
    let people = people().await;
    let thirty = people.get_by_index("age", &BoundDescriptor::only(30)).await.unwrap();
    assert_eq!(names(&thirty), vec!["al", "cy"]);
}

#[tokio::test]
async fn test_unbounded_scan_is_index_ordered() {
    let people = people().await;
    let all = people.get_by_index("age", &BoundDescriptor::all()).await.unwrap();
    assert_eq!(names(&all), vec!["di", "al", "cy", "bo"]);

    let by_name = people.get_by_index("name", &BoundDescriptor::all()).await.unwrap();
    assert_eq!(names(&by_name), vec!["al", "bo", "cy", "di"]);
}

#[tokio::test]
async fn test_lower_bound_scans() {
    let people = people().await;

    let inclusive = people
        .get_by_index("age", &BoundDescriptor::lower(30, false))
        .await
        .unwrap();
    assert_eq!(names(&inclusive), vec!["al", "cy", "bo"]);

    let exclusive = people
        .get_by_index("age", &BoundDescriptor::lower(30, true))
        .await
        .unwrap();
    assert_eq!(names(&exclusive), vec!["bo"]);
}

#[tokio::test]
async fn test_upper_bound_honours_not_include() {
    let people = people().await;
    let under_thirty = people
        .get_by_index("age", &BoundDescriptor::upper(30, true))
        .await
        .unwrap();
    assert_eq!(names(&under_thirty), vec!["di"]);
}

#[tokio::test]
async fn test_legacy_upper_bound_is_inclusive() {
    let db = open_with(BoundMode::Legacy, Cycle::default()).await;
    let people = db.handle("people").unwrap();
    let up_to_thirty = people
        .get_by_index("age", &BoundDescriptor::upper(30, true))
        .await
        .unwrap();
    assert_eq!(names(&up_to_thirty), vec!["di", "al", "cy"]);
}

#[tokio::test]
async fn test_records_missing_the_indexed_field_are_skipped() {
    let people = people().await;
    people.create(json!({"name": "ageless"})).await.unwrap();

    let by_age = people.get_by_index("age", &BoundDescriptor::all()).await.unwrap();
    assert_eq!(by_age.len(), 4);
    assert_eq!(people.get_all().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_unknown_index_is_operation_error() {
    let people = people().await;
    let err = people
        .get_by_index("height", &BoundDescriptor::all())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Operation(_)));
}

#[tokio::test]
async fn test_descriptor_from_host_json() {
    let people = people().await;
    let bounds: BoundDescriptor =
        serde_json::from_value(json!({"lowerBound": {"value": "bo", "notInclude": true}})).unwrap();
    let after_bo = people.get_by_index("name", &bounds).await.unwrap();
    assert_eq!(names(&after_bo), vec!["cy", "di"]);
}

#[tokio::test]
async fn test_callback_scan_runs_in_host_cycle() {
    let cycle = Cycle::default();
    let db = open_with(BoundMode::Independent, cycle.clone()).await;
    let people = db.handle("people").unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    people
        .get_by_index_with(
            "age",
            &BoundDescriptor::only(30),
            Callbacks::new().on_success(move |records: Vec<Value>| {
                sink.borrow_mut().extend(records);
            }),
        )
        .unwrap()
        .await;

    assert_eq!(names(&seen.borrow()), vec!["al", "cy"]);
    assert_eq!(cycle.runs.get(), 1);
}

#[tokio::test]
async fn test_callback_crud_round_trip() {
    let cycle = Cycle::default();
    let db = open_with(BoundMode::Independent, cycle.clone()).await;
    let people = db.handle("people").unwrap();

    let key = Rc::new(RefCell::new(None));
    let sink = key.clone();
    people
        .update_with(
            json!({"name": "ed", "age": 51}),
            Callbacks::new().on_success(move |k| *sink.borrow_mut() = Some(k)),
        )
        .unwrap()
        .await;
    let key: Key = key.borrow().clone().unwrap();
    assert_eq!(key, Key::from(5));

    let deleted = Rc::new(Cell::new(false));
    let flag = deleted.clone();
    people
        .delete_id_with(key.clone(), Callbacks::new().on_success(move |()| flag.set(true)))
        .unwrap()
        .await;
    assert!(deleted.get());

    let all = Rc::new(RefCell::new(Vec::new()));
    let sink = all.clone();
    people
        .get_all_with(Callbacks::new().on_success(move |records| *sink.borrow_mut() = records))
        .unwrap()
        .await;
    assert_eq!(all.borrow().len(), 4);

    let found = Rc::new(RefCell::new(None));
    let sink = found.clone();
    people
        .find_by_index_with(
            "name",
            Key::from("di"),
            Callbacks::<(Option<Value>, Key)>::new()
                .on_success(move |(record, _key)| *sink.borrow_mut() = record),
        )
        .unwrap()
        .await;
    assert_eq!(found.borrow().as_ref().unwrap()["age"], 25);

    assert_eq!(cycle.runs.get(), 4);
}
