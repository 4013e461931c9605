use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::check::{Category, Checker, IdRange, MismatchReport, WorkSource};
use crate::compare::Comparator;
use crate::model::Group;
use crate::store::{require_group, RecordStore};
use crate::types::{GroupId, Result};

/// Findings of [`CanonicalCollisionChecker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalCategory {
    /// Two groups with the same spacegroup have matching canonicals.
    SameClassificationMatch,
    /// Matching canonicals whose spacegroups disagree.
    DifferentClassificationMatch,
    /// The comparator failed on a canonical pair.
    ComparatorError,
}

impl Category for CanonicalCategory {
    const ALL: &'static [Self] = &[
        CanonicalCategory::SameClassificationMatch,
        CanonicalCategory::DifferentClassificationMatch,
        CanonicalCategory::ComparatorError,
    ];

    fn tag(self) -> &'static str {
        match self {
            CanonicalCategory::SameClassificationMatch => "same-classification-match",
            CanonicalCategory::DifferentClassificationMatch => "different-classification-match",
            CanonicalCategory::ComparatorError => "comparator-error",
        }
    }

    fn error_bucket() -> Option<Self> {
        None
    }
}

/// Groups sharing a composition, whatever their spacegroup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositionBucket {
    /// Reduced formula shared by the groups.
    pub composition: String,
    /// At least two group ids, ascending.
    pub groups: Vec<GroupId>,
}

impl fmt::Display for CompositionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} groups)", self.composition, self.groups.len())
    }
}

/// Flags distinct groups whose canonicals the comparator considers equal.
pub struct CanonicalCollisionChecker {
    store: Arc<dyn RecordStore>,
    comparator: Arc<dyn Comparator>,
}

impl CanonicalCollisionChecker {
    /// Checker over the groups of `store`.
    pub fn new(store: Arc<dyn RecordStore>, comparator: Arc<dyn Comparator>) -> Self {
        Self { store, comparator }
    }

    /// Buckets the groups in `range` by composition, dropping lone groups.
    pub fn buckets(&self, range: IdRange) -> Result<Vec<CompositionBucket>> {
        let mut by_composition: BTreeMap<String, Vec<GroupId>> = BTreeMap::new();
        for id in self.store.group_ids()? {
            if !range.contains(id.0) {
                continue;
            }
            let group = require_group(self.store.as_ref(), id)?;
            by_composition
                .entry(group.composition_key)
                .or_default()
                .push(id);
        }
        Ok(by_composition
            .into_iter()
            .filter(|(_, groups)| groups.len() >= 2)
            .map(|(composition, groups)| CompositionBucket {
                composition,
                groups,
            })
            .collect())
    }
}

impl Checker for CanonicalCollisionChecker {
    type Item = CompositionBucket;
    type Category = CanonicalCategory;

    fn name(&self) -> &'static str {
        "canonical"
    }

    fn items(&self, range: IdRange) -> Result<WorkSource<'_, CompositionBucket>> {
        Ok(Box::new(self.buckets(range)?.into_iter()))
    }

    fn check_item(&self, bucket: &CompositionBucket) -> Result<MismatchReport<CanonicalCategory>> {
        let groups = bucket
            .groups
            .iter()
            .map(|id| require_group(self.store.as_ref(), *id))
            .collect::<Result<Vec<Group>>>()?;

        let mut report = MismatchReport::new();
        for (i, left) in groups.iter().enumerate() {
            for right in &groups[i + 1..] {
                let pair = format!(
                    "composition={} group={} canonical={} spacegroup={} vs group={} canonical={} spacegroup={}",
                    bucket.composition,
                    left.id,
                    left.canonical.id,
                    left.spacegroup,
                    right.id,
                    right.canonical.id,
                    right.spacegroup,
                );
                match self.comparator.matches(&left.canonical, &right.canonical) {
                    Ok(false) => {}
                    Ok(true) if left.spacegroup == right.spacegroup => {
                        report.push(CanonicalCategory::SameClassificationMatch, pair)
                    }
                    Ok(true) => report.push(CanonicalCategory::DifferentClassificationMatch, pair),
                    Err(err) => {
                        report.push(CanonicalCategory::ComparatorError, format!("{pair}: {err}"))
                    }
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::FnComparator;
    use crate::model::{Lattice, Record, RecordSpec, Site, Structure};
    use crate::store::MemoryStore;
    use crate::types::RecordId;

    fn seed(store: &MemoryStore, id: u64, species: &str, spacegroup: u16) -> Result<()> {
        let spec = RecordSpec::new(
            Structure::new(Lattice::cubic(3.6), vec![Site::new(species, [0.0; 3])]),
            spacegroup,
        );
        let record = Record::new(RecordId(id), spec)?;
        store.put_record(&record)?;
        store.put_group(&Group::new(GroupId(id), record))
    }

    fn checker() -> Result<CanonicalCollisionChecker> {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 1, "Cu", 225)?;
        seed(&store, 2, "Cu", 221)?;
        seed(&store, 3, "Ni", 225)?;
        seed(&store, 4, "Cu", 225)?;
        let always = Arc::new(FnComparator::new(|_: &Record, _: &Record| Ok(true)));
        Ok(CanonicalCollisionChecker::new(store, always))
    }

    #[test]
    fn buckets_drop_lone_groups_and_respect_range() -> Result<()> {
        let checker = checker()?;
        let all = checker.buckets(IdRange::default())?;
        assert_eq!(
            all,
            vec![CompositionBucket {
                composition: "Cu".into(),
                groups: vec![GroupId(1), GroupId(2), GroupId(4)],
            }]
        );
        assert!(checker.buckets(IdRange::new(2, 3))?.is_empty());
        let narrowed = checker.buckets(IdRange::new(1, 2))?;
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].groups, vec![GroupId(1), GroupId(2)]);
        Ok(())
    }

    #[test]
    fn matches_split_by_spacegroup_agreement() -> Result<()> {
        let checker = checker()?;
        let bucket = checker.buckets(IdRange::default())?.remove(0);
        let report = checker.check_item(&bucket)?;
        assert_eq!(report.count(CanonicalCategory::SameClassificationMatch), 1);
        assert_eq!(report.count(CanonicalCategory::DifferentClassificationMatch), 2);
        assert!(report.get(CanonicalCategory::SameClassificationMatch)[0]
            .contains("group=1 canonical=1 spacegroup=225 vs group=4"));
        Ok(())
    }
}
