use std::collections::BTreeSet;
use std::time::Duration;

use ingest::coordination::Coordinator;
use ingest::coordination::memory::MemoryCoordinator;
use ingest::destination::Destination;
use ingest::destination::memory::MemoryDestination;
use ingest::error::ErrorKind;
use ingest::schema::table_helper::TableHelper;
use ingest::test_utils::faulty_coordinator::{CoordinatorOperation, FaultyCoordinator};
use ingest::types::{SqlColumn, Table, TableKey};
use ingest_telemetry::init_test_tracing;

use crate::memory_config;

type Helper = TableHelper<MemoryDestination, MemoryCoordinator>;

/// Builds a helper per simulated process, all sharing the same database and coordinator.
fn processes(
    count: usize,
    destination: &MemoryDestination,
    coordinator: &MemoryCoordinator,
) -> Vec<Helper> {
    let config = memory_config("shared");
    (0..count)
        .map(|_| TableHelper::new(&config, destination.clone(), coordinator.clone()))
        .collect()
}

fn table(columns: &[&str]) -> Table {
    columns.iter().fold(Table::new("events"), |table, column| {
        table.with_column(*column, SqlColumn::new("int64"))
    })
}

async fn live_columns(destination: &MemoryDestination) -> BTreeSet<String> {
    destination.tables().await["events"]
        .columns
        .keys()
        .cloned()
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_processes_converge_to_the_union_of_columns() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let coordinator = MemoryCoordinator::new();
    destination.create_table(&table(&["id"])).await.unwrap();

    let helpers = processes(8, &destination, &coordinator);
    let tasks: Vec<_> = helpers
        .into_iter()
        .enumerate()
        .map(|(i, helper)| {
            tokio::spawn(async move {
                let column = format!("c{i}");
                helper
                    .ensure_table(&table(&["id", "common", column.as_str()]))
                    .await
            })
        })
        .collect();

    for task in tasks {
        let ensured = task.await.unwrap().unwrap();
        assert!(ensured.columns.contains_key("common"));
    }

    let expected: BTreeSet<String> = ["id", "common"]
        .into_iter()
        .map(String::from)
        .chain((0..8).map(|i| format!("c{i}")))
        .collect();
    assert_eq!(live_columns(&destination).await, expected);

    // One migration per process, each adding its own column, and `common` added exactly once.
    let patches = destination.patches().await;
    assert_eq!(patches.len(), 8);
    assert_eq!(
        patches
            .iter()
            .filter(|diff| diff.columns.contains_key("common"))
            .count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn identical_changes_from_two_processes_migrate_once() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let coordinator = MemoryCoordinator::new();
    destination.create_table(&table(&["id"])).await.unwrap();

    let helpers = processes(2, &destination, &coordinator);
    let desired = table(&["id", "a"]);
    let (first, second) = tokio::join!(
        helpers[0].ensure_table(&desired),
        helpers[1].ensure_table(&desired)
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(destination.patches().await.len(), 1);
    assert_eq!(
        live_columns(&destination).await,
        BTreeSet::from(["a".to_string(), "id".to_string()])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_first_use_creates_the_table_once() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let coordinator = MemoryCoordinator::new();
    let helpers = processes(2, &destination, &coordinator);

    let (first, second) = tokio::join!(
        helpers[0].ensure_table(&table(&["id", "a"])),
        helpers[1].ensure_table(&table(&["id", "b"]))
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(destination.created_tables().await, vec!["events".to_string()]);
    assert_eq!(destination.patches().await.len(), 1);
    assert_eq!(
        live_columns(&destination).await,
        BTreeSet::from(["a".to_string(), "b".to_string(), "id".to_string()])
    );
}

fn named_table(name: &str, columns: &[&str]) -> Table {
    columns.iter().fold(Table::new(name), |table, column| {
        table.with_column(*column, SqlColumn::new("int64"))
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn tables_of_one_destination_migrate_concurrently() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let coordinator = MemoryCoordinator::new();
    destination
        .create_table(&named_table("events", &["id"]))
        .await
        .unwrap();
    destination
        .create_table(&named_table("sessions", &["id"]))
        .await
        .unwrap();

    let helpers = processes(2, &destination, &coordinator);
    let (events, sessions) = tokio::join!(
        helpers[0].ensure_table(&named_table("events", &["id", "a"])),
        helpers[1].ensure_table(&named_table("sessions", &["id", "b"]))
    );
    assert!(events.unwrap().columns.contains_key("a"));
    assert!(sessions.unwrap().columns.contains_key("b"));

    let tables = destination.tables().await;
    assert!(tables["events"].columns.contains_key("a"));
    assert!(!tables["events"].columns.contains_key("b"));
    assert!(tables["sessions"].columns.contains_key("b"));
    assert_eq!(destination.patches().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn held_table_lock_does_not_block_other_tables() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let coordinator = MemoryCoordinator::with_lock_timeout(Duration::from_millis(200));
    destination
        .create_table(&named_table("events", &["id"]))
        .await
        .unwrap();
    destination
        .create_table(&named_table("sessions", &["id"]))
        .await
        .unwrap();
    let helpers = processes(1, &destination, &coordinator);

    coordinator
        .lock(&TableKey::new("shared", "events"))
        .await
        .unwrap();

    // Another table of the same destination migrates while `events` is held.
    helpers[0]
        .ensure_table(&named_table("sessions", &["id", "b"]))
        .await
        .unwrap();

    // The held table itself cannot be migrated until the lock is released.
    let err = helpers[0]
        .ensure_table(&named_table("events", &["id", "a"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CoordinationFailed);

    coordinator
        .unlock(&TableKey::new("shared", "events"))
        .await
        .unwrap();
    helpers[0]
        .ensure_table(&named_table("events", &["id", "a"]))
        .await
        .unwrap();
    assert_eq!(destination.patches().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_cache_is_reloaded_before_patching() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let coordinator = MemoryCoordinator::new();
    let helpers = processes(2, &destination, &coordinator);

    // Both processes cache the table at version 0.
    helpers[0].ensure_table(&table(&["id"])).await.unwrap();
    helpers[1].ensure_table(&table(&["id"])).await.unwrap();

    let first = helpers[0].ensure_table(&table(&["id", "a"])).await.unwrap();
    assert_eq!(first.version, 1);

    let second = helpers[1].ensure_table(&table(&["id", "b"])).await.unwrap();
    assert_eq!(second.version, 2);
    assert!(second.columns.contains_key("a"));
    assert!(second.columns.contains_key("b"));

    // The second process only added its own column.
    let patches = destination.patches().await;
    assert_eq!(patches.len(), 2);
    assert_eq!(
        patches[1].columns.keys().collect::<Vec<_>>(),
        vec![&"b".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn coordination_failure_leaves_cache_untouched_and_releases_the_lock() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let coordinator = FaultyCoordinator::wrap(MemoryCoordinator::new());
    let helper = TableHelper::new(
        &memory_config("shared"),
        destination.clone(),
        coordinator.clone(),
    );

    helper.ensure_table(&table(&["id"])).await.unwrap();

    coordinator.fail(
        CoordinatorOperation::IncrementVersion,
        ErrorKind::CoordinationFailed,
        Some(1),
    );
    let err = helper
        .ensure_table(&table(&["id", "a"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CoordinationFailed);

    // The cached entry was dropped rather than partially updated.
    assert!(helper.cached_table("events").is_none());
    assert!(
        !coordinator
            .wrapped()
            .is_locked(&ingest::types::TableKey::new("shared", "events"))
    );

    // The next attempt reloads the live schema, which already has the column.
    let ensured = helper.ensure_table(&table(&["id", "a"])).await.unwrap();
    assert!(ensured.columns.contains_key("a"));
    assert_eq!(destination.patches().await.len(), 1);
}
