#![allow(missing_docs)]

mod support;

use std::fs;
use std::sync::Arc;

use strudex::check::sink::{JsonLinesSink, MemorySink};
use strudex::check::{
    CanonicalCategory, CanonicalCollisionChecker, CheckOptions, CheckRunner, Checker,
    ExternalIdCategory, ExternalIdChecker, IdRange, ProgressSnapshot, RunState,
    SpacegroupCategory, SpacegroupChecker,
};
use strudex::compare::{FnComparator, MetricClassifier};
use strudex::model::{Lattice, Record, Site};
use strudex::types::{Result, StrudexError};

use support::{edge_comparator, memory_registry, rocksalt, silicon};

fn small_grid() -> CheckOptions {
    CheckOptions {
        rows: 2,
        cols: 3,
        workers: 3,
        flush_every: 2,
        ..CheckOptions::default()
    }
}

#[test]
fn spacegroup_checker_reports_drift() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.05));
    registry.add_record(silicon(5.43), None)?;

    let mut stretched = silicon(5.43);
    stretched.structure.lattice = Lattice {
        c: 6.0,
        ..Lattice::cubic(5.43)
    };
    registry.add_record(stretched, None)?;

    let mut alloy = silicon(5.43);
    alloy.structure.sites[1] = Site {
        occupancy: 0.5,
        ..Site::new("Ge", [0.25, 0.25, 0.25])
    };
    registry.add_record(alloy, None)?;

    let checker = SpacegroupChecker::new(store, Arc::new(MetricClassifier::default()));
    let mut runner = CheckRunner::new(checker, small_grid());
    let summary = runner.run()?;
    assert_eq!(runner.state(), RunState::Finalized);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.count(SpacegroupCategory::Reclassified), 1);
    assert_eq!(summary.count(SpacegroupCategory::DefaultedToUnknown), 1);
    assert_eq!(summary.count(SpacegroupCategory::ComparatorError), 0);
    assert_eq!(summary.failed, 0);

    let report = summary.to_report();
    assert_eq!(report.checker, "spacegroup");
    assert_eq!(report.totals.len(), 4);
    assert_eq!(report.totals["other-error"], 0);
    assert_eq!(report.issues, 2);
    Ok(())
}

#[test]
fn canonical_checker_separates_classification_outcomes() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.05));
    registry.add_record(silicon(5.43), None)?;
    registry.add_record(silicon(5.50), None)?;
    let mut tetragonal = silicon(5.45);
    tetragonal.spacegroup = 141;
    registry.add_record(tetragonal, None)?;
    registry.add_record(rocksalt(5.64), None)?;

    let checker = CanonicalCollisionChecker::new(store, edge_comparator(0.2));
    let buckets = checker.buckets(IdRange::default())?;
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].composition, "Si");
    assert_eq!(buckets[0].groups.len(), 3);

    let summary = CheckRunner::new(checker, small_grid()).run()?;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.count(CanonicalCategory::SameClassificationMatch), 1);
    assert_eq!(summary.count(CanonicalCategory::DifferentClassificationMatch), 2);
    assert_eq!(summary.count(CanonicalCategory::ComparatorError), 0);
    Ok(())
}

#[test]
fn canonical_checker_records_comparator_failures() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.05));
    registry.add_record(silicon(5.43), None)?;
    registry.add_record(silicon(6.43), None)?;

    let broken = Arc::new(FnComparator::new(|_: &Record, _: &Record| {
        Err(StrudexError::Comparator("payload unreadable".into()))
    }));
    let summary = CheckRunner::new(CanonicalCollisionChecker::new(store, broken), small_grid())
        .run()?;
    assert_eq!(summary.count(CanonicalCategory::ComparatorError), 1);
    assert!(summary.evidence.get(CanonicalCategory::ComparatorError)[0]
        .ends_with("payload unreadable"));
    assert_eq!(summary.failed, 0);
    Ok(())
}

#[test]
fn external_ids_must_share_a_group() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.05));
    registry.add_record(silicon(5.43).with_external_id("mp-1"), None)?;
    registry.add_record(silicon(6.43).with_external_id("mp-1"), None)?;
    registry.add_record(silicon(7.43).with_external_id("mp-2"), None)?;
    registry.add_record(silicon(7.43).with_external_id("mp-2"), None)?;
    registry.add_record(rocksalt(5.64).with_external_id("mp-3"), None)?;

    let checker = ExternalIdChecker::new(store);
    let items: Vec<_> = checker.items(IdRange::default())?.collect();
    assert_eq!(items.len(), 2);

    let summary = CheckRunner::new(checker, small_grid()).run()?;
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.count(ExternalIdCategory::SameExternalId), 1);
    let evidence = &summary.evidence.get(ExternalIdCategory::SameExternalId)[0];
    assert!(evidence.starts_with("external_id=mp-1 record=1 group=1 record=2 group=2"));
    Ok(())
}

#[test]
fn evidence_reaches_the_sink_exactly_once() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.05));
    for i in 0..12 {
        let mut spec = silicon(5.0 + f64::from(i) * 0.1);
        spec.structure.lattice.c += 0.5;
        registry.add_record(spec, None)?;
    }
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("progress.jsonl");
    let sink = Arc::new(JsonLinesSink::open(&path)?);
    let checker = SpacegroupChecker::new(store, Arc::new(MetricClassifier::default()));
    let summary = CheckRunner::new(checker, small_grid())
        .with_sink(sink)
        .run()?;
    assert_eq!(summary.count(SpacegroupCategory::Reclassified), 12);

    let snapshots: Vec<ProgressSnapshot> = fs::read_to_string(&path)?
        .lines()
        .map(serde_json::from_str)
        .collect::<std::result::Result<_, _>>()?;
    assert!(snapshots.len() >= 2);
    let last = snapshots.last().expect("final snapshot");
    assert!(last.final_flush);
    assert_eq!(last.processed, 12);
    assert_eq!(last.category_totals["reclassified"], 12);
    assert_eq!(last.grid.iter().flatten().sum::<u64>(), 12);

    let delivered: Vec<&String> = snapshots
        .iter()
        .filter_map(|s| s.evidence.get("reclassified"))
        .flatten()
        .collect();
    assert_eq!(delivered.len(), 12);
    Ok(())
}

#[test]
fn dropped_evidence_keeps_totals() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.05));
    let mut stretched = silicon(5.43);
    stretched.structure.lattice.c = 6.0;
    registry.add_record(stretched, None)?;

    let sink = Arc::new(MemorySink::new());
    let checker = SpacegroupChecker::new(store, Arc::new(MetricClassifier::default()));
    let summary = CheckRunner::new(
        checker,
        CheckOptions {
            retain_evidence: false,
            ..small_grid()
        },
    )
    .with_sink(sink.clone())
    .run()?;
    assert_eq!(summary.count(SpacegroupCategory::Reclassified), 1);
    assert!(summary.evidence.is_empty());
    assert_eq!(sink.evidence("reclassified").len(), 1);
    Ok(())
}
