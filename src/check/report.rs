use std::collections::BTreeMap;

use crate::check::Category;

/// Evidence strings grouped by category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MismatchReport<C: Category> {
    entries: BTreeMap<C, Vec<String>>,
}

impl<C: Category> Default for MismatchReport<C> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<C: Category> MismatchReport<C> {
    /// Empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one discrepancy.
    pub fn push(&mut self, category: C, evidence: impl Into<String>) {
        self.entries.entry(category).or_default().push(evidence.into());
    }

    /// Moves every entry of `other` into `self`.
    pub fn merge(&mut self, other: MismatchReport<C>) {
        for (category, mut evidence) in other.entries {
            self.entries.entry(category).or_default().append(&mut evidence);
        }
    }

    /// Evidence recorded under `category`.
    pub fn get(&self, category: C) -> &[String] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of discrepancies under `category`.
    pub fn count(&self, category: C) -> usize {
        self.get(category).len()
    }

    /// Number of discrepancies across all categories.
    pub fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Iterates non-empty categories in order.
    pub fn iter(&self) -> impl Iterator<Item = (C, &[String])> {
        self.entries
            .iter()
            .filter(|(_, evidence)| !evidence.is_empty())
            .map(|(category, evidence)| (*category, evidence.as_slice()))
    }

    /// Empties the report, returning its previous contents.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Same contents keyed by category tag.
    pub fn to_tagged(&self) -> BTreeMap<String, Vec<String>> {
        self.iter()
            .map(|(category, evidence)| (category.tag().to_string(), evidence.to_vec()))
            .collect()
    }
}
