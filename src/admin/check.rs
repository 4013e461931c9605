use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::check::{
    CanonicalCollisionChecker, CheckOptions, CheckReport, CheckRunner, Checker,
    ExternalIdChecker, GroupMemberChecker, ProgressSink, SpacegroupChecker,
};
use crate::compare::{Classifier, MetricClassifier};
use crate::registry::GroupRegistry;
use crate::store::RecordStore;

use crate::admin::{AdminError, Result};

/// The bundled checkers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckKind {
    /// Recompute spacegroups.
    Spacegroup,
    /// Re-match group members against their canonical.
    Members,
    /// Look for distinct groups with matching canonicals.
    Canonical,
    /// Records sharing an external id across groups.
    ExternalId,
}

impl CheckKind {
    /// Every kind, in the order `check all` runs them.
    pub const ALL: [CheckKind; 4] = [
        CheckKind::Spacegroup,
        CheckKind::Members,
        CheckKind::Canonical,
        CheckKind::ExternalId,
    ];

    /// Name as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Spacegroup => "spacegroup",
            CheckKind::Members => "members",
            CheckKind::Canonical => "canonical",
            CheckKind::ExternalId => "external-id",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = AdminError;

    fn from_str(value: &str) -> Result<Self> {
        CheckKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| AdminError::UnknownChecker(value.to_string()))
    }
}

/// Runs one bundled checker against the registry's store and comparator.
///
/// Spacegroups are recomputed with the default [`MetricClassifier`].
pub fn run_check(
    registry: &GroupRegistry,
    kind: CheckKind,
    opts: CheckOptions,
    sink: Arc<dyn ProgressSink>,
) -> Result<CheckReport> {
    let store: Arc<dyn RecordStore> = Arc::clone(registry.store());
    let comparator = Arc::clone(registry.comparator());
    match kind {
        CheckKind::Spacegroup => {
            let classifier: Arc<dyn Classifier> = Arc::new(MetricClassifier::default());
            execute(SpacegroupChecker::new(store, classifier), opts, sink)
        }
        CheckKind::Members => execute(GroupMemberChecker::new(store, comparator), opts, sink),
        CheckKind::Canonical => {
            execute(CanonicalCollisionChecker::new(store, comparator), opts, sink)
        }
        CheckKind::ExternalId => execute(ExternalIdChecker::new(store), opts, sink),
    }
}

fn execute<K: Checker>(
    checker: K,
    opts: CheckOptions,
    sink: Arc<dyn ProgressSink>,
) -> Result<CheckReport> {
    let mut runner = CheckRunner::new(checker, opts).with_sink(sink);
    Ok(runner.run()?.to_report())
}
