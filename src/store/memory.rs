use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::model::{Group, GroupKey, Record};
use crate::store::RecordStore;
use crate::types::{GroupId, RecordId, Result};

#[derive(Default)]
struct Tables {
    records: BTreeMap<RecordId, Record>,
    groups: BTreeMap<GroupId, Group>,
    by_key: FxHashMap<GroupKey, BTreeSet<GroupId>>,
    membership: FxHashMap<RecordId, GroupId>,
}

impl Tables {
    fn index_group(&mut self, group: &Group) {
        self.by_key
            .entry(group.group_key.clone())
            .or_default()
            .insert(group.id);
        for member in &group.members {
            self.membership.insert(*member, group.id);
        }
    }
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from previously exported rows.
    pub fn from_parts(records: Vec<Record>, groups: Vec<Group>) -> Self {
        let mut tables = Tables::default();
        for record in records {
            tables.records.insert(record.id, record);
        }
        for group in groups {
            tables.index_group(&group);
            tables.groups.insert(group.id, group);
        }
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Copies every record and group out, in id order.
    pub fn export(&self) -> (Vec<Record>, Vec<Group>) {
        let tables = self.tables.read();
        (
            tables.records.values().cloned().collect(),
            tables.groups.values().cloned().collect(),
        )
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.tables.read().records.len()
    }

    /// Number of stored groups.
    pub fn group_count(&self) -> usize {
        self.tables.read().groups.len()
    }
}

impl RecordStore for MemoryStore {
    fn put_record(&self, record: &Record) -> Result<()> {
        self.tables.write().records.insert(record.id, record.clone());
        Ok(())
    }

    fn record(&self, id: RecordId) -> Result<Option<Record>> {
        Ok(self.tables.read().records.get(&id).cloned())
    }

    fn record_ids(&self) -> Result<Vec<RecordId>> {
        Ok(self.tables.read().records.keys().copied().collect())
    }

    fn max_record_id(&self) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .records
            .keys()
            .next_back()
            .map_or(0, |id| id.0))
    }

    fn put_group(&self, group: &Group) -> Result<()> {
        let mut tables = self.tables.write();
        if let Some(previous) = tables.groups.get(&group.id) {
            if previous.group_key != group.group_key {
                let old_key = previous.group_key.clone();
                if let Some(ids) = tables.by_key.get_mut(&old_key) {
                    ids.remove(&group.id);
                }
            }
        }
        tables.index_group(group);
        tables.groups.insert(group.id, group.clone());
        Ok(())
    }

    fn group(&self, id: GroupId) -> Result<Option<Group>> {
        Ok(self.tables.read().groups.get(&id).cloned())
    }

    fn group_ids(&self) -> Result<Vec<GroupId>> {
        Ok(self.tables.read().groups.keys().copied().collect())
    }

    fn max_group_id(&self) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .groups
            .keys()
            .next_back()
            .map_or(0, |id| id.0))
    }

    fn groups_with_key(&self, key: &GroupKey) -> Result<Vec<Group>> {
        let tables = self.tables.read();
        let Some(ids) = tables.by_key.get(key) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| tables.groups.get(id).cloned())
            .collect())
    }

    fn group_containing(&self, id: RecordId) -> Result<Option<GroupId>> {
        Ok(self.tables.read().membership.get(&id).copied())
    }
}
