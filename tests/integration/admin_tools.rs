#![allow(missing_docs)]

mod support;

use std::path::PathBuf;
use std::sync::Arc;

use strudex::admin::{
    open_registry, open_store, reconcile, run_check, stats, verify, AdminError,
    AdminOpenOptions, CheckKind, CheckOptions, VerifyLevel, VerifySeverity,
};
use strudex::check::sink::NoopSink;
use strudex::model::Group;
use strudex::store::RecordStore;
use strudex::types::{GroupId, RecordId};
use tempfile::TempDir;

use support::{rocksalt, silicon};

fn creating() -> AdminOpenOptions {
    AdminOpenOptions {
        create_if_missing: true,
        ..AdminOpenOptions::default()
    }
}

fn seeded_store(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.json"));
    let handle = open_registry(&path, &creating()).expect("open registry");
    for spec in [silicon(5.43), silicon(5.43), rocksalt(5.64)] {
        handle.registry.add_record(spec, None).expect("add");
    }
    handle
        .registry
        .deprecate(RecordId(2), "duplicate upload")
        .expect("deprecate");
    handle.flush().expect("flush");
    (dir, path)
}

#[test]
fn missing_store_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("absent.json");
    match open_store(&path, &AdminOpenOptions::default()) {
        Err(AdminError::MissingStore(reported)) => assert_eq!(reported, path),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("store should be missing"),
    }
}

#[test]
fn stats_summarize_a_reopened_store() {
    let (_dir, path) = seeded_store("stats");
    let store = open_store(&path, &AdminOpenOptions::default()).expect("reopen");
    let report = stats(store.as_ref()).expect("stats");
    assert_eq!(report.records, 3);
    assert_eq!(report.groups, 2);
    assert_eq!(report.singleton_groups, 1);
    assert_eq!(report.largest_group, Some(GroupId(1)));
    assert_eq!(report.largest_group_size, 2);
    assert_eq!(report.deprecated_records, 1);
    assert_eq!(report.ungrouped_records, 0);
    assert_eq!(report.distinct_keys, 2);
    assert_eq!(report.distinct_compositions, 2);
}

#[test]
fn verify_flags_a_corrupted_group() {
    let (_dir, path) = seeded_store("verify");
    let store = open_store(&path, &AdminOpenOptions::default()).expect("reopen");
    assert!(verify(store.as_ref(), VerifyLevel::Full).expect("verify").success);

    // graft the rocksalt record into the silicon group
    let mut group: Group = store.group(GroupId(1)).expect("read").expect("group");
    group.members.insert(RecordId(3));
    store.put_group(&group).expect("write");

    let fast = verify(store.as_ref(), VerifyLevel::Fast).expect("verify");
    assert!(fast.success);
    let full = verify(store.as_ref(), VerifyLevel::Full).expect("verify");
    assert!(!full.success);
    let messages: Vec<&str> = full
        .findings
        .iter()
        .filter(|f| f.severity == VerifySeverity::Error)
        .map(|f| f.message.as_str())
        .collect();
    assert!(messages.iter().any(|m| m.contains("member of groups")));
    assert!(messages.iter().any(|m| m.contains("record 3 key")));
}

#[test]
fn reconcile_places_orphans_and_persists() {
    let (_dir, path) = seeded_store("reconcile");
    {
        let store = open_store(&path, &AdminOpenOptions::default()).expect("reopen");
        let orphan = strudex::model::Record::new(RecordId(4), silicon(5.43)).expect("record");
        store.put_record(&orphan).expect("write");
        store.flush().expect("flush");
    }

    let handle = open_registry(&path, &AdminOpenOptions::default()).expect("open");
    let report = reconcile(&handle.registry).expect("reconcile");
    assert_eq!(report.examined, 1);
    assert_eq!(report.joined, 1);
    handle.flush().expect("flush");
    drop(handle);

    let store = open_store(&path, &AdminOpenOptions::default()).expect("reopen");
    assert_eq!(store.group_containing(RecordId(4)).expect("read"), Some(GroupId(1)));
    let verified = verify(store.as_ref(), VerifyLevel::Full).expect("verify");
    assert!(verified.findings.is_empty());
}

#[test]
fn every_check_kind_runs_against_a_file_store() {
    let (_dir, path) = seeded_store("checks");
    let handle = open_registry(&path, &AdminOpenOptions::default()).expect("open");
    for kind in CheckKind::ALL {
        let report = run_check(
            &handle.registry,
            kind,
            CheckOptions::default(),
            Arc::new(NoopSink),
        )
        .expect("check");
        assert_eq!(report.checker, kind.as_str());
        assert_eq!(report.failed, 0);
        assert_eq!(report.issues, 0, "{kind} found {:?}", report.evidence);
    }
    assert_eq!("external-id".parse::<CheckKind>().expect("parse"), CheckKind::ExternalId);
    assert!("bogus".parse::<CheckKind>().is_err());
}
