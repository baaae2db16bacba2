//! Integration tests for the persistent store: transactions, locking
//! semantics, and corruption handling.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use brokkr_core::types::{
    AddinDescription, Dependency, ExtensionNodeSet, ExtensionPoint, ModuleDescription,
};
use brokkr_core::AddinVersion;
use brokkr_store::Store;

fn sample_description() -> AddinDescription {
    let mut point = ExtensionPoint::new("/App/Tools");
    point.root_addin = "App.Core".to_string();

    let mut node_set = ExtensionNodeSet::new("ToolSet");
    node_set.node_sets.push("CommonSet".to_string());

    AddinDescription {
        namespace: "App".to_string(),
        local_id: "Core".to_string(),
        version: AddinVersion::parse("1.0").unwrap(),
        compat_version: Some(AddinVersion::parse("0.9").unwrap()),
        is_root: true,
        author: Some("Someone".to_string()),
        source_file: PathBuf::from("addins/core.addin.yaml"),
        main_module: ModuleDescription {
            files: vec![PathBuf::from("core.so")],
            dependencies: vec![Dependency::Assembly {
                name: "libwidgets.so".to_string(),
            }],
            ..Default::default()
        },
        extension_points: vec![point],
        node_sets: vec![node_set],
        ..Default::default()
    }
}

#[test]
fn description_round_trips_through_the_store() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let desc = sample_description();
    let record = Store::addin_record(&desc.addin_id(), &desc.version.to_string());

    let mut tx = store.begin_transaction().unwrap().expect("no other writer");
    tx.write(&record, &desc).unwrap();
    tx.commit().unwrap();

    let loaded: AddinDescription = store.read(&record).expect("record should be present");
    assert_eq!(loaded.extension_points, desc.extension_points);
    assert_eq!(loaded.node_sets, desc.node_sets);
    assert_eq!(loaded.main_module.dependencies, desc.main_module.dependencies);
    assert_eq!(loaded, desc);
}

#[test]
fn second_transaction_is_busy_and_mutates_nothing() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let desc = sample_description();
    let record = Store::addin_record("App.Core", "1.0");

    let mut first = store.begin_transaction().unwrap().expect("first writer");
    first.write(&record, &desc).unwrap();

    // Second writer gets told "busy" while the first is open
    assert!(store.begin_transaction().unwrap().is_none());

    // Nothing is visible until the first commits
    assert!(store.read::<AddinDescription>(&record).is_none());
    first.commit().unwrap();
    assert!(store.read::<AddinDescription>(&record).is_some());

    // And the store is exactly what the first transaction committed
    let loaded: AddinDescription = store.read(&record).unwrap();
    assert_eq!(loaded, desc);

    // After commit the slot is free again
    assert!(store.begin_transaction().unwrap().is_some());
}

#[test]
fn rollback_discards_staged_writes() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let record = Store::addin_record("App.Core", "1.0");

    let mut tx = store.begin_transaction().unwrap().unwrap();
    tx.write(&record, &sample_description()).unwrap();
    tx.rollback();

    assert!(store.read::<AddinDescription>(&record).is_none());
    assert!(!store.contains(&record));
}

#[test]
fn dropping_an_open_transaction_rolls_back() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let record = Store::addin_record("App.Core", "1.0");

    {
        let mut tx = store.begin_transaction().unwrap().unwrap();
        tx.write(&record, &sample_description()).unwrap();
        // dropped without commit
    }

    assert!(store.read::<AddinDescription>(&record).is_none());
    assert!(store.begin_transaction().unwrap().is_some());
}

#[test]
fn corrupted_record_reads_as_absent() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let record = Store::addin_record("App.Core", "1.0");

    let mut tx = store.begin_transaction().unwrap().unwrap();
    tx.write(&record, &sample_description()).unwrap();
    tx.commit().unwrap();

    // Truncate the committed record
    fs::write(dir.path().join(&record), b"\x00\x01garbage").unwrap();
    assert!(store.read::<AddinDescription>(&record).is_none());
}

#[test]
fn delete_is_applied_on_commit() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let record = Store::addin_record("App.Core", "1.0");

    let mut tx = store.begin_transaction().unwrap().unwrap();
    tx.write(&record, &sample_description()).unwrap();
    tx.commit().unwrap();
    assert!(store.contains(&record));

    let mut tx = store.begin_transaction().unwrap().unwrap();
    tx.delete(&record);
    tx.commit().unwrap();
    assert!(!store.contains(&record));
}

#[test]
fn shared_object_garbage_collection() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let live_hash = Store::content_hash(b"live source");
    let dead_hash = Store::content_hash(b"dead source");

    let mut tx = store.begin_transaction().unwrap().unwrap();
    tx.write(&Store::shared_record(&live_hash), &sample_description())
        .unwrap();
    tx.write(&Store::shared_record(&dead_hash), &sample_description())
        .unwrap();
    tx.commit().unwrap();

    let mut live = HashSet::new();
    live.insert(live_hash.clone());
    let removed = store.collect_shared_garbage(&live).unwrap();

    assert_eq!(removed, 1);
    assert!(store.contains(&Store::shared_record(&live_hash)));
    assert!(!store.contains(&Store::shared_record(&dead_hash)));
}

#[test]
fn read_and_write_locks_are_scoped() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    {
        let _read = store.lock_read().unwrap();
        // A second shared lock coexists with the first
        let _read2 = store.lock_read().unwrap();
    }
    {
        let _write = store.lock_write().unwrap();
    }
    // Both released on scope exit
    let _read = store.lock_read().unwrap();
}
