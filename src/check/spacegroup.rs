use std::sync::Arc;

use crate::check::{Category, Checker, IdRange, MismatchReport, WorkSource};
use crate::compare::Classifier;
use crate::store::{require_record, RecordStore};
use crate::types::{RecordId, Result};

/// Findings of [`SpacegroupChecker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpacegroupCategory {
    /// The analyzer now assigns a different spacegroup.
    Reclassified,
    /// The analyzer could not determine a spacegroup.
    DefaultedToUnknown,
    /// The analyzer rejected the structure.
    ComparatorError,
    /// The record could not be loaded.
    OtherError,
}

impl Category for SpacegroupCategory {
    const ALL: &'static [Self] = &[
        SpacegroupCategory::Reclassified,
        SpacegroupCategory::DefaultedToUnknown,
        SpacegroupCategory::ComparatorError,
        SpacegroupCategory::OtherError,
    ];

    fn tag(self) -> &'static str {
        match self {
            SpacegroupCategory::Reclassified => "reclassified",
            SpacegroupCategory::DefaultedToUnknown => "defaulted-to-unknown",
            SpacegroupCategory::ComparatorError => "comparator-error",
            SpacegroupCategory::OtherError => "other-error",
        }
    }

    fn error_bucket() -> Option<Self> {
        Some(SpacegroupCategory::OtherError)
    }
}

/// Recomputes each record's spacegroup and flags drift from the stored value.
pub struct SpacegroupChecker {
    store: Arc<dyn RecordStore>,
    classifier: Arc<dyn Classifier>,
}

impl SpacegroupChecker {
    /// Checker reading records from `store`.
    pub fn new(store: Arc<dyn RecordStore>, classifier: Arc<dyn Classifier>) -> Self {
        Self { store, classifier }
    }
}

impl Checker for SpacegroupChecker {
    type Item = RecordId;
    type Category = SpacegroupCategory;

    fn name(&self) -> &'static str {
        "spacegroup"
    }

    fn items(&self, range: IdRange) -> Result<WorkSource<'_, RecordId>> {
        let ids = self.store.record_ids()?;
        Ok(Box::new(ids.into_iter().filter(move |id| range.contains(id.0))))
    }

    fn check_item(&self, id: &RecordId) -> Result<MismatchReport<SpacegroupCategory>> {
        let record = require_record(self.store.as_ref(), *id)?;
        let mut report = MismatchReport::new();
        match self.classifier.classify(&record) {
            Ok(recomputed) if recomputed == record.spacegroup => {}
            Ok(0) => report.push(
                SpacegroupCategory::DefaultedToUnknown,
                format!("record={id} stored={} recomputed=unknown", record.spacegroup),
            ),
            Ok(recomputed) => report.push(
                SpacegroupCategory::Reclassified,
                format!("record={id} stored={} recomputed={recomputed}", record.spacegroup),
            ),
            Err(err) => report.push(
                SpacegroupCategory::ComparatorError,
                format!("record={id}: {err}"),
            ),
        }
        Ok(report)
    }
}
