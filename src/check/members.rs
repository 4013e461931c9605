use std::sync::Arc;

use tracing::debug;

use crate::check::{Category, Checker, IdRange, MismatchReport, WorkSource};
use crate::compare::Comparator;
use crate::store::{require_group, RecordStore};
use crate::types::{GroupId, Result};

/// Findings of [`GroupMemberChecker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberCategory {
    /// A member no longer matches its canonical, or could not be read.
    MemberMismatch,
    /// The group itself could not be loaded.
    OtherError,
}

impl Category for MemberCategory {
    const ALL: &'static [Self] = &[MemberCategory::MemberMismatch, MemberCategory::OtherError];

    fn tag(self) -> &'static str {
        match self {
            MemberCategory::MemberMismatch => "member-mismatch",
            MemberCategory::OtherError => "other-error",
        }
    }

    fn error_bucket() -> Option<Self> {
        Some(MemberCategory::OtherError)
    }
}

/// Re-runs the comparator between every member and its group's canonical.
pub struct GroupMemberChecker {
    store: Arc<dyn RecordStore>,
    comparator: Arc<dyn Comparator>,
}

impl GroupMemberChecker {
    /// Checker over the groups of `store`.
    pub fn new(store: Arc<dyn RecordStore>, comparator: Arc<dyn Comparator>) -> Self {
        Self { store, comparator }
    }
}

impl Checker for GroupMemberChecker {
    type Item = GroupId;
    type Category = MemberCategory;

    fn name(&self) -> &'static str {
        "members"
    }

    fn items(&self, range: IdRange) -> Result<WorkSource<'_, GroupId>> {
        let ids = self.store.group_ids()?;
        Ok(Box::new(ids.into_iter().filter(move |id| range.contains(id.0))))
    }

    fn check_item(&self, id: &GroupId) -> Result<MismatchReport<MemberCategory>> {
        let group = require_group(self.store.as_ref(), *id)?;
        let canonical = &group.canonical;
        let mut report = MismatchReport::new();
        for member_id in group.members.iter().filter(|m| **m != canonical.id) {
            let prefix = format!("group={id} canonical={} member={member_id}", canonical.id);
            let member = match self.store.record(*member_id) {
                Ok(Some(member)) => member,
                Ok(None) => {
                    report.push(MemberCategory::MemberMismatch, format!("{prefix}: unreadable"));
                    continue;
                }
                Err(err) => {
                    report.push(
                        MemberCategory::MemberMismatch,
                        format!("{prefix}: unreadable: {err}"),
                    );
                    continue;
                }
            };
            match self.comparator.matches(&member, canonical) {
                Ok(true) => {}
                Ok(false) => report.push(
                    MemberCategory::MemberMismatch,
                    format!("{prefix}: no longer matches canonical"),
                ),
                Err(err) => {
                    debug!(
                        group = id.0,
                        member = member_id.0,
                        error = %err,
                        "check.members.compare_failed"
                    );
                    report.push(
                        MemberCategory::MemberMismatch,
                        format!("{prefix}: comparison failed: {err}"),
                    );
                }
            }
        }
        Ok(report)
    }
}
