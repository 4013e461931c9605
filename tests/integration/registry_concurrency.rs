#![allow(missing_docs)]

mod support;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use strudex::admin::reconcile;
use strudex::compare::FnComparator;
use strudex::model::Record;
use strudex::primitives::concurrency::LockOptions;
use strudex::registry::{GroupRegistry, RegistryOptions};
use strudex::store::{MemoryStore, RecordStore};
use strudex::types::{RecordId, Result};

use support::{edge_comparator, silicon};

fn patient_registry(tol: f64) -> (Arc<MemoryStore>, Arc<GroupRegistry>) {
    let store = Arc::new(MemoryStore::new());
    let opts = RegistryOptions {
        lock: LockOptions {
            max_attempts: 10_000,
            backoff: Duration::from_millis(2),
            lease: Duration::from_secs(5),
        },
    };
    let registry = GroupRegistry::open(store.clone(), edge_comparator(tol), opts).expect("open");
    (store, Arc::new(registry))
}

/// Every record is in at most one group and member counts add up.
fn assert_partition(store: &MemoryStore, expected_records: usize) -> Result<()> {
    let mut seen = BTreeSet::new();
    let mut total = 0;
    for id in store.group_ids()? {
        let group = store.group(id)?.expect("group");
        for member in &group.members {
            assert!(seen.insert(*member), "record {member} in two groups");
            assert_eq!(store.group_containing(*member)?, Some(id));
        }
        total += group.size();
    }
    assert_eq!(total, expected_records);
    assert_eq!(store.record_ids()?.len(), expected_records);
    Ok(())
}

#[test]
fn concurrent_adds_lose_nothing() -> Result<()> {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;
    let (store, registry) = patient_registry(0.05);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    // three distinct cells, all under one key
                    let edge = 5.0 + ((t + i) % 3) as f64 * 0.5;
                    registry.add_record(silicon(edge), None).expect("add");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker");
    }

    assert_partition(&store, THREADS * PER_THREAD)?;
    assert_eq!(store.group_count(), 3);
    let ids: BTreeSet<RecordId> = store.record_ids()?.into_iter().collect();
    assert_eq!(ids.len(), THREADS * PER_THREAD);
    assert_eq!(ids.iter().next_back(), Some(&RecordId((THREADS * PER_THREAD) as u64)));

    let counters = registry.counters()?;
    assert_eq!(counters.groups_created, 3);
    assert_eq!(counters.joins as usize, THREADS * PER_THREAD - 3);
    Ok(())
}

#[test]
fn busy_lock_leaves_a_record_for_reconciliation() -> Result<()> {
    let slow = Arc::new(AtomicBool::new(true));
    let entered = Arc::new(AtomicBool::new(false));
    let comparator = {
        let slow = Arc::clone(&slow);
        let entered = Arc::clone(&entered);
        Arc::new(FnComparator::new(move |_: &Record, _: &Record| {
            entered.store(true, Ordering::SeqCst);
            if slow.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(300));
            }
            Ok(true)
        }))
    };
    let store = Arc::new(MemoryStore::new());
    let registry = GroupRegistry::open(
        store.clone(),
        comparator,
        RegistryOptions {
            lock: LockOptions {
                max_attempts: 2,
                backoff: Duration::from_millis(1),
                lease: Duration::from_secs(5),
            },
        },
    )?;
    let founder = registry.add_record(silicon(5.43), None)?;

    let busy = thread::scope(|scope| {
        let slow_add = scope.spawn(|| registry.add_record(silicon(5.43), None));
        while !entered.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        let busy = registry.add_record(silicon(5.43), None);
        slow_add.join().expect("slow add").expect("placed");
        busy
    });
    match busy {
        Err(err) => assert!(err.is_retryable(), "unexpected error {err}"),
        Ok(_) => panic!("add should have hit a busy lock"),
    }
    slow.store(false, Ordering::SeqCst);

    assert_eq!(registry.find_ungrouped()?, vec![RecordId(3)]);
    let report = reconcile(&registry).expect("reconcile");
    assert_eq!(report.examined, 1);
    assert_eq!(report.joined, 1);
    assert!(report.failures.is_empty());
    assert!(registry.find_ungrouped()?.is_empty());
    assert_eq!(
        store.group(founder.group.id)?.map(|g| g.size()),
        Some(3)
    );
    assert_partition(&store, 3)?;
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn members_always_match_their_canonical(edges in prop::collection::vec(0u8..6, 1..40)) {
        let (store, registry) = patient_registry(0.05);
        for step in &edges {
            registry.add_record(silicon(5.0 + f64::from(*step) * 0.1), None).expect("add");
        }
        assert_partition(&store, edges.len()).expect("partition");
        let distinct: BTreeSet<u8> = edges.iter().copied().collect();
        prop_assert_eq!(store.group_count(), distinct.len());
        for id in store.group_ids().expect("ids") {
            let group = store.group(id).expect("read").expect("group");
            for member in &group.members {
                let record = store.record(*member).expect("read").expect("record");
                let drift = record.structure.lattice.a - group.canonical.structure.lattice.a;
                prop_assert!(drift.abs() < 0.05);
            }
        }
    }
}
