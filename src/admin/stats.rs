use std::collections::BTreeSet;

use serde::Serialize;

use crate::store::RecordStore;
use crate::types::GroupId;

use crate::admin::Result;

/// Summary of a store's contents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsReport {
    pub records: u64,
    pub groups: u64,
    pub singleton_groups: u64,
    pub largest_group: Option<GroupId>,
    pub largest_group_size: u64,
    pub ordered_records: u64,
    pub deprecated_records: u64,
    pub ungrouped_records: u64,
    pub distinct_keys: u64,
    pub distinct_compositions: u64,
}

/// Counts records and groups, including singleton, deprecated and ungrouped ones.
pub fn stats(store: &dyn RecordStore) -> Result<StatsReport> {
    let mut report = StatsReport::default();
    let mut keys = BTreeSet::new();
    let mut compositions = BTreeSet::new();

    for id in store.group_ids()? {
        let Some(group) = store.group(id)? else {
            continue;
        };
        report.groups += 1;
        let size = group.size() as u64;
        if group.is_singleton() {
            report.singleton_groups += 1;
        }
        if size > report.largest_group_size {
            report.largest_group_size = size;
            report.largest_group = Some(group.id);
        }
        keys.insert(group.group_key);
        compositions.insert(group.composition_key);
    }

    for id in store.record_ids()? {
        let Some(record) = store.record(id)? else {
            continue;
        };
        report.records += 1;
        if record.ordered {
            report.ordered_records += 1;
        }
        if record.is_deprecated() {
            report.deprecated_records += 1;
        }
        if store.group_containing(id)?.is_none() {
            report.ungrouped_records += 1;
        }
    }

    report.distinct_keys = keys.len() as u64;
    report.distinct_compositions = compositions.len() as u64;
    Ok(report)
}
