#![allow(missing_docs)]

mod support;

use strudex::check::{CheckOptions, CheckRunner, GroupMemberChecker, MemberCategory};
use strudex::model::{Lattice, RecordSpec, Structure};
use strudex::registry::{GroupRegistry, RegistryOptions};
use strudex::store::RecordStore;
use strudex::types::{GroupId, RecordId, Result};

use support::{edge_comparator, memory_registry, silicon};

#[test]
fn scenarios_a_through_e() -> Result<()> {
    let comparator = edge_comparator(0.05);
    let (store, registry) = memory_registry(comparator.clone());

    // A: first record founds a group
    let a = registry.add_record(silicon(5.43), None)?;
    assert!(a.is_new_group);
    assert_eq!(a.record.composition_key, "Si");
    assert_eq!(a.record.spacegroup, 227);
    let g1 = a.group.id;
    assert_eq!(a.group.canonical_id(), a.record.id);
    assert_eq!(a.group.members.len(), 1);

    // B: matches A and joins
    let b = registry.add_record(silicon(5.44), None)?;
    assert!(!b.is_new_group);
    assert_eq!(b.group.id, g1);
    assert_eq!(b.group.canonical_id(), a.record.id);
    assert_eq!(
        b.group.members.iter().copied().collect::<Vec<_>>(),
        vec![a.record.id, b.record.id]
    );

    // C: same key, no match
    let c = registry.add_record(silicon(5.60), None)?;
    assert!(c.is_new_group);
    let g2 = c.group.id;
    assert_ne!(g1, g2);
    assert_eq!(c.group.canonical_id(), c.record.id);

    // D: both groups are consistent
    let checker = GroupMemberChecker::new(store.clone(), comparator.clone());
    let summary = CheckRunner::new(checker, CheckOptions::default()).run()?;
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.count(MemberCategory::MemberMismatch), 0);
    assert_eq!(summary.failed, 0);

    // E: drift B's payload in place
    let mut drifted = b.record.clone();
    drifted.structure.lattice = Lattice::cubic(6.5);
    store.put_record(&drifted)?;
    let checker = GroupMemberChecker::new(store.clone(), comparator);
    let summary = CheckRunner::new(checker, CheckOptions::default()).run()?;
    assert_eq!(summary.count(MemberCategory::MemberMismatch), 1);
    let evidence = summary.evidence.get(MemberCategory::MemberMismatch);
    assert_eq!(
        evidence[0],
        format!(
            "group={g1} canonical={} member={}: no longer matches canonical",
            a.record.id, b.record.id
        )
    );
    Ok(())
}

#[test]
fn larger_candidate_wins_the_tie() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.08));

    let small = registry.add_record(silicon(4.10), None)?.group.id;
    for _ in 0..2 {
        assert_eq!(registry.add_record(silicon(4.10), None)?.group.id, small);
    }
    let large = registry.add_record(silicon(4.00), None)?.group.id;
    for _ in 0..4 {
        assert_eq!(registry.add_record(silicon(4.00), None)?.group.id, large);
    }
    assert!(small < large);
    assert_eq!(store.group(small)?.map(|g| g.size()), Some(3));
    assert_eq!(store.group(large)?.map(|g| g.size()), Some(5));

    // 4.05 is within tolerance of both canonicals
    let placed = registry.add_record(silicon(4.05), None)?;
    assert_eq!(placed.group.id, large);
    assert_eq!(placed.group.size(), 6);
    Ok(())
}

#[test]
fn equal_sizes_prefer_the_older_group() -> Result<()> {
    let (_store, registry) = memory_registry(edge_comparator(0.08));
    let first = registry.add_record(silicon(4.10), None)?.group.id;
    let second = registry.add_record(silicon(4.00), None)?.group.id;
    assert_ne!(first, second);
    assert_eq!(registry.add_record(silicon(4.05), None)?.group.id, first);
    Ok(())
}

#[test]
fn accepting_hint_beats_a_larger_group() -> Result<()> {
    let (_store, registry) = memory_registry(edge_comparator(0.08));
    let small = registry.add_record(silicon(4.10), None)?.group.id;
    let large = registry.add_record(silicon(4.00), None)?.group.id;
    for _ in 0..2 {
        registry.add_record(silicon(4.00), None)?;
    }

    let placed = registry.add_record(silicon(4.05), Some(small))?;
    assert_eq!(placed.group.id, small);
    assert_ne!(placed.group.id, large);
    assert_eq!(registry.counters()?.hint_hits, 1);

    // a hint naming no group falls back to the candidate scan
    let fallback = registry.add_record(silicon(4.05), Some(GroupId(999)))?;
    assert_eq!(fallback.group.id, large);
    Ok(())
}

#[test]
fn different_keys_never_share_a_group() -> Result<()> {
    let (_store, registry) = memory_registry(edge_comparator(1.0));
    let cubic = registry.add_record(silicon(5.43), None)?;
    let mut other = silicon(5.43);
    other.spacegroup = 141;
    let tetragonal = registry.add_record(other, Some(cubic.group.id))?;
    assert!(tetragonal.is_new_group);
    assert_ne!(cubic.record.group_key, tetragonal.record.group_key);
    Ok(())
}

#[test]
fn reinserting_a_member_is_a_no_op() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.05));
    let a = registry.add_record(silicon(5.43), None)?;
    let b = registry.add_record(silicon(5.43), None)?;
    assert_eq!(b.group.size(), 2);

    assert!(!registry.join_candidate(&b.record, a.group.id)?);
    assert!(!registry.join_candidate(&a.record, a.group.id)?);
    assert_eq!(store.group(a.group.id)?.map(|g| g.size()), Some(2));
    Ok(())
}

#[test]
fn group_keys_stay_consistent() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.05));
    for (i, a) in [5.43, 5.44, 5.70, 5.71, 6.0].into_iter().enumerate() {
        let mut spec = silicon(a);
        if i % 2 == 1 {
            spec.spacegroup = 141;
        }
        registry.add_record(spec, None)?;
    }
    for id in store.group_ids()? {
        let group = store.group(id)?.expect("listed group");
        assert_eq!(group.canonical.group_key, group.group_key);
        for member in &group.members {
            let record = store.record(*member)?.expect("member record");
            assert_eq!(record.group_key, group.group_key);
        }
    }
    Ok(())
}

#[test]
fn invalid_specs_are_rejected_before_allocation() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.05));
    let mut bad = silicon(5.43);
    bad.spacegroup = 300;
    assert!(registry.add_record(bad, None).is_err());
    let empty = RecordSpec::new(
        Structure::new(Lattice::cubic(1.0), Vec::new()),
        1,
    );
    assert!(registry.add_record(empty, None).is_err());
    assert!(store.record_ids()?.is_empty());

    let first = registry.add_record(silicon(5.43), None)?;
    assert_eq!(first.record.id, RecordId(1));
    assert_eq!(first.group.id, GroupId(1));
    Ok(())
}

#[test]
fn annotations_follow_the_canonical() -> Result<()> {
    let (store, registry) = memory_registry(edge_comparator(0.05));
    let a = registry.add_record(silicon(5.43).with_external_id("ext-1"), None)?;
    let b = registry.add_record(silicon(5.43), None)?;

    registry.append_remark(a.record.id, "checked by hand")?;
    registry.deprecate(b.record.id, "superseded")?;

    let group = store.group(a.group.id)?.expect("group");
    assert_eq!(group.canonical.annotations, vec!["checked by hand".to_string()]);
    let b_stored = store.record(b.record.id)?.expect("record");
    assert!(b_stored.is_deprecated());

    let switched = registry.set_canonical(a.group.id, b.record.id)?;
    assert_eq!(switched.canonical_id(), b.record.id);
    assert_eq!(switched.size(), 2);
    assert!(switched.canonical.is_deprecated());
    Ok(())
}

#[test]
fn registry_resumes_id_sequences() -> Result<()> {
    let comparator = edge_comparator(0.05);
    let (store, registry) = memory_registry(comparator.clone());
    registry.add_record(silicon(5.43), None)?;
    registry.add_record(silicon(6.43), None)?;
    drop(registry);

    let reopened = GroupRegistry::open(store, comparator, RegistryOptions::default())?;
    let next = reopened.add_record(silicon(7.43), None)?;
    assert_eq!(next.record.id, RecordId(3));
    assert_eq!(next.group.id, GroupId(3));
    Ok(())
}
