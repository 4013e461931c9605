//! The deduplication index: assigns ids and places records into groups.
//!
//! Every group mutation runs inside one registry-wide [`LockService`] lease,
//! so concurrent [`GroupRegistry::add_record`] calls are serialized from the
//! moment the record is persisted until its group is written back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compare::Comparator;
use crate::model::{Group, Record, RecordSpec, DEPRECATED_PREFIX};
use crate::primitives::concurrency::{LockOptions, LockService, LockSnapshot};
use crate::store::{require_group, require_record, RecordStore};
use crate::types::{GroupId, RecordId, Result, StrudexError};

/// Registry configuration.
#[derive(Clone, Debug, Default)]
pub struct RegistryOptions {
    /// Retry and lease settings of the registry lock.
    pub lock: LockOptions,
}

/// Result of placing a record.
#[derive(Clone, Debug)]
pub struct AddOutcome {
    /// The persisted record.
    pub record: Record,
    /// The group the record belongs to after the call.
    pub group: Group,
    /// True when `group` was created by this call.
    pub is_new_group: bool,
}

/// Counters of placement decisions since the registry was opened.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct RegistryCounters {
    /// Groups created.
    pub groups_created: u64,
    /// Records that joined an existing group.
    pub joins: u64,
    /// Joins satisfied by the caller's hint.
    pub hint_hits: u64,
    /// Comparator failures while evaluating candidates.
    pub comparator_errors: u64,
}

struct RegistryState {
    next_group_id: u64,
    counters: RegistryCounters,
}

/// Owns group placement for one store.
pub struct GroupRegistry {
    store: Arc<dyn RecordStore>,
    comparator: Arc<dyn Comparator>,
    next_record_id: AtomicU64,
    state: LockService<RegistryState>,
}

impl GroupRegistry {
    /// Opens a registry over `store`, continuing id sequences after the
    /// highest ids already stored.
    pub fn open(
        store: Arc<dyn RecordStore>,
        comparator: Arc<dyn Comparator>,
        opts: RegistryOptions,
    ) -> Result<Self> {
        let next_record_id = store.max_record_id()? + 1;
        let next_group_id = store.max_group_id()? + 1;
        debug!(next_record_id, next_group_id, "registry.opened");
        Ok(Self {
            store,
            comparator,
            next_record_id: AtomicU64::new(next_record_id),
            state: LockService::new(
                "registry",
                RegistryState {
                    next_group_id,
                    counters: RegistryCounters::default(),
                },
                opts.lock,
            ),
        })
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// The comparator used for placement.
    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.comparator
    }

    /// Ingests a new record and places it into a group.
    ///
    /// The record is persisted before the registry lock is taken, so a
    /// `LockBusy` failure leaves it stored but ungrouped; [`regroup`] or the
    /// reconciliation sweep can place it later. When `hint` names a group it
    /// is tried before any other candidate.
    ///
    /// [`regroup`]: Self::regroup
    pub fn add_record(&self, spec: RecordSpec, hint: Option<GroupId>) -> Result<AddOutcome> {
        spec.validate()?;
        let id = RecordId(self.next_record_id.fetch_add(1, Ordering::SeqCst));
        let record = Record::new(id, spec)?;
        self.store.put_record(&record)?;

        let mut state = self.state.acquire().inspect_err(|_| {
            warn!(record = %id, "registry.add.ungrouped");
        })?;
        let (group, is_new_group) = self.place(&mut state, &record, hint)?;
        drop(state);

        debug!(
            record = %id,
            group = %group.id,
            key = %record.group_key,
            is_new_group,
            "registry.add.placed"
        );
        Ok(AddOutcome {
            record,
            group,
            is_new_group,
        })
    }

    /// Places an already persisted record that has no group yet.
    ///
    /// Returns the existing group unchanged when the record is already grouped.
    pub fn regroup(&self, id: RecordId) -> Result<AddOutcome> {
        let mut state = self.state.acquire()?;
        let record = require_record(self.store.as_ref(), id)?;
        if let Some(existing) = self.store.group_containing(id)? {
            let group = require_group(self.store.as_ref(), existing)?;
            return Ok(AddOutcome {
                record,
                group,
                is_new_group: false,
            });
        }
        let (group, is_new_group) = self.place(&mut state, &record, None)?;
        info!(record = %id, group = %group.id, is_new_group, "registry.regrouped");
        Ok(AddOutcome {
            record,
            group,
            is_new_group,
        })
    }

    /// Offers an existing record to one group without allocating anything.
    ///
    /// Returns true when the record was added. A record that is already a
    /// member of any group is never added again.
    pub fn join_candidate(&self, record: &Record, group_id: GroupId) -> Result<bool> {
        let mut state = self.state.acquire()?;
        if let Some(existing) = self.store.group_containing(record.id)? {
            debug!(record = %record.id, group = %existing, "registry.join.already_grouped");
            return Ok(false);
        }
        let mut group = require_group(self.store.as_ref(), group_id)?;
        if !self.eligible(&mut state, record, &group) {
            return Ok(false);
        }
        group.add_member(record.id);
        self.store.put_group(&group)?;
        state.counters.joins += 1;
        Ok(true)
    }

    /// Makes `record_id` the canonical record of `group_id`.
    ///
    /// The record must already be a member; the member set is preserved.
    pub fn set_canonical(&self, group_id: GroupId, record_id: RecordId) -> Result<Group> {
        let _state = self.state.acquire()?;
        let mut group = require_group(self.store.as_ref(), group_id)?;
        let record = require_record(self.store.as_ref(), record_id)?;
        let previous = group.canonical_id();
        group.replace_canonical(record)?;
        self.store.put_group(&group)?;
        info!(
            group = %group_id,
            previous = %previous,
            canonical = %record_id,
            "registry.canonical_switched"
        );
        Ok(group)
    }

    /// Appends a free-form remark to a record.
    pub fn append_remark(&self, id: RecordId, remark: &str) -> Result<Record> {
        if remark.trim().is_empty() {
            return Err(StrudexError::Invalid("empty remark".into()));
        }
        self.annotate(id, "remark", remark)
    }

    /// Marks a record deprecated. Records are never deleted.
    pub fn deprecate(&self, id: RecordId, reason: &str) -> Result<Record> {
        self.annotate(id, "deprecate", &format!("{DEPRECATED_PREFIX}: {reason}"))
    }

    /// Ids of stored records that belong to no group.
    pub fn find_ungrouped(&self) -> Result<Vec<RecordId>> {
        let _state = self.state.acquire()?;
        let mut ungrouped = Vec::new();
        for id in self.store.record_ids()? {
            if self.store.group_containing(id)?.is_none() {
                ungrouped.push(id);
            }
        }
        Ok(ungrouped)
    }

    /// Placement counters since the registry was opened.
    pub fn counters(&self) -> Result<RegistryCounters> {
        Ok(self.state.acquire()?.counters)
    }

    /// Activity of the registry lock.
    pub fn lock_snapshot(&self) -> LockSnapshot {
        self.state.snapshot()
    }

    fn annotate(&self, id: RecordId, action: &str, remark: &str) -> Result<Record> {
        let _state = self.state.acquire()?;
        let mut record = require_record(self.store.as_ref(), id)?;
        record.append_remark(action, remark);
        self.store.put_record(&record)?;
        if let Some(group_id) = self.store.group_containing(id)? {
            let mut group = require_group(self.store.as_ref(), group_id)?;
            if group.canonical_id() == id {
                group.canonical = record.clone();
                self.store.put_group(&group)?;
                debug!(record = %id, group = %group_id, "registry.annotation.propagated");
            }
        }
        Ok(record)
    }

    /// Hint first, then same-key groups largest first; the first group that
    /// accepts the record wins. Creates a group when none does.
    fn place(
        &self,
        state: &mut RegistryState,
        record: &Record,
        hint: Option<GroupId>,
    ) -> Result<(Group, bool)> {
        if let Some(hint) = hint {
            match self.store.group(hint)? {
                Some(mut group) => {
                    if self.eligible(state, record, &group) {
                        group.add_member(record.id);
                        self.store.put_group(&group)?;
                        state.counters.joins += 1;
                        state.counters.hint_hits += 1;
                        return Ok((group, false));
                    }
                }
                None => debug!(hint = %hint, "registry.add.hint_missing"),
            }
        }

        let mut candidates = self.store.groups_with_key(&record.group_key)?;
        candidates.sort_by(|x, y| y.size().cmp(&x.size()).then(x.id.cmp(&y.id)));
        for mut group in candidates {
            if Some(group.id) == hint {
                continue;
            }
            if self.eligible(state, record, &group) {
                group.add_member(record.id);
                self.store.put_group(&group)?;
                state.counters.joins += 1;
                return Ok((group, false));
            }
        }

        let group = Group::new(GroupId(state.next_group_id), record.clone());
        state.next_group_id += 1;
        self.store.put_group(&group)?;
        state.counters.groups_created += 1;
        Ok((group, true))
    }

    fn eligible(&self, state: &mut RegistryState, record: &Record, group: &Group) -> bool {
        if group.group_key != record.group_key
            || group.canonical.ordered != record.ordered
            || group.contains(record.id)
        {
            return false;
        }
        match self.comparator.matches(record, &group.canonical) {
            Ok(matched) => matched,
            Err(err) => {
                state.counters.comparator_errors += 1;
                warn!(
                    record = %record.id,
                    group = %group.id,
                    canonical = %group.canonical_id(),
                    error = %err,
                    "registry.compare.failed"
                );
                false
            }
        }
    }
}
