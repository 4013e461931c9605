//! Comparison seam: the equivalence predicate and the classification analyzer.
//!
//! The registry and the checkers only see the [`Comparator`] and
//! [`Classifier`] traits. [`StructureMatcher`] and [`MetricClassifier`] are the
//! bundled tolerance-based implementations; [`FnComparator`] wraps a closure
//! for deterministic fakes.

mod matcher;
mod symmetry;

pub use matcher::{MatcherOptions, StructureMatcher};
pub use symmetry::{CrystalSystem, MetricClassifier};

use crate::model::Record;
use crate::types::Result;

/// Equivalence predicate between two records.
///
/// Must be pure: the same inputs always produce the same answer. An `Err`
/// means the payloads could not be compared at all.
pub trait Comparator: Send + Sync {
    /// Whether `a` and `b` describe the same entity within tolerance.
    fn matches(&self, a: &Record, b: &Record) -> Result<bool>;
}

/// Recomputes a record's discrete classification (spacegroup number).
pub trait Classifier: Send + Sync {
    /// Classification for `record`, 0 when it cannot be determined.
    fn classify(&self, record: &Record) -> Result<u16>;
}

/// Closure-backed [`Comparator`].
pub struct FnComparator<F> {
    func: F,
}

impl<F> FnComparator<F>
where
    F: Fn(&Record, &Record) -> Result<bool> + Send + Sync,
{
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Comparator for FnComparator<F>
where
    F: Fn(&Record, &Record) -> Result<bool> + Send + Sync,
{
    fn matches(&self, a: &Record, b: &Record) -> Result<bool> {
        (self.func)(a, b)
    }
}
