use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::check::{Category, Checker, IdRange, MismatchReport, WorkSource};
use crate::store::RecordStore;
use crate::types::{GroupId, RecordId, Result};

/// Findings of [`ExternalIdChecker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExternalIdCategory {
    /// Records sharing an external id were placed in different groups.
    SameExternalId,
}

impl Category for ExternalIdCategory {
    const ALL: &'static [Self] = &[ExternalIdCategory::SameExternalId];

    fn tag(self) -> &'static str {
        match self {
            ExternalIdCategory::SameExternalId => "same-external-id",
        }
    }

    fn error_bucket() -> Option<Self> {
        None
    }
}

/// An external id carried by two or more records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalIdItem {
    /// The shared identifier.
    pub external_id: String,
    /// Records carrying it, ascending.
    pub records: Vec<RecordId>,
}

impl fmt::Display for ExternalIdItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} records)", self.external_id, self.records.len())
    }
}

/// Every record with the same external id must live in the same group.
pub struct ExternalIdChecker {
    store: Arc<dyn RecordStore>,
}

impl ExternalIdChecker {
    /// Checker over the records of `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

impl Checker for ExternalIdChecker {
    type Item = ExternalIdItem;
    type Category = ExternalIdCategory;

    fn name(&self) -> &'static str {
        "external-id"
    }

    fn items(&self, range: IdRange) -> Result<WorkSource<'_, ExternalIdItem>> {
        let mut by_external: BTreeMap<String, Vec<RecordId>> = BTreeMap::new();
        for id in self.store.record_ids()? {
            if !range.contains(id.0) {
                continue;
            }
            if let Some(external_id) = self.store.record(id)?.and_then(|r| r.external_id) {
                by_external.entry(external_id).or_default().push(id);
            }
        }
        Ok(Box::new(
            by_external
                .into_iter()
                .filter(|(_, records)| records.len() >= 2)
                .map(|(external_id, records)| ExternalIdItem {
                    external_id,
                    records,
                }),
        ))
    }

    fn check_item(&self, item: &ExternalIdItem) -> Result<MismatchReport<ExternalIdCategory>> {
        let placements = item
            .records
            .iter()
            .map(|id| Ok((*id, self.store.group_containing(*id)?)))
            .collect::<Result<Vec<(RecordId, Option<GroupId>)>>>()?;

        let mut report = MismatchReport::new();
        for (i, (left, left_group)) in placements.iter().enumerate() {
            for (right, right_group) in &placements[i + 1..] {
                // an ungrouped record never counts as agreeing
                if left_group.is_some() && left_group == right_group {
                    continue;
                }
                report.push(
                    ExternalIdCategory::SameExternalId,
                    format!(
                        "external_id={} record={left} group={} record={right} group={}",
                        item.external_id,
                        describe(*left_group),
                        describe(*right_group),
                    ),
                );
            }
        }
        Ok(report)
    }
}

fn describe(group: Option<GroupId>) -> String {
    group.map_or_else(|| "none".to_string(), |g| g.to_string())
}
