//! Batch consistency verification.
//!
//! A [`Checker`] supplies a lazy work source and per-item verification logic
//! over a closed [`Category`] vocabulary. [`CheckRunner`] fans the items out
//! to a fixed pool of worker threads, merges each item's
//! [`MismatchReport`] into a lock-guarded aggregate, bumps the
//! [`ProgressGrid`], and periodically pushes snapshots to a [`ProgressSink`].

mod canonical;
mod external_id;
mod grid;
mod members;
mod report;
mod runner;
pub mod sink;
mod spacegroup;

use std::fmt;
use std::hash::Hash;

pub use canonical::{CanonicalCategory, CanonicalCollisionChecker, CompositionBucket};
pub use external_id::{ExternalIdCategory, ExternalIdChecker, ExternalIdItem};
pub use grid::ProgressGrid;
pub use members::{GroupMemberChecker, MemberCategory};
pub use report::MismatchReport;
pub use runner::{CheckOptions, CheckReport, CheckRunner, RunState, RunSummary};
pub use sink::{ProgressSink, ProgressSnapshot};
pub use spacegroup::{SpacegroupCategory, SpacegroupChecker};

use crate::types::Result;

/// Closed set of finding categories for one checker.
pub trait Category: Copy + Ord + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every variant, in reporting order.
    const ALL: &'static [Self];

    /// Stable kebab-case tag used in snapshots and reports.
    fn tag(self) -> &'static str;

    /// Bucket receiving items whose verification failed outright, if the
    /// checker has one. Failures are always counted either way.
    fn error_bucket() -> Option<Self>;
}

/// Inclusive id bounds applied to a checker's work source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdRange {
    /// Lowest id included.
    pub start: u64,
    /// Highest id included.
    pub end: u64,
}

impl IdRange {
    /// Range covering `start..=end`.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Whether `id` falls inside the range.
    pub fn contains(&self, id: u64) -> bool {
        self.start <= id && id <= self.end
    }
}

impl Default for IdRange {
    fn default() -> Self {
        Self {
            start: 0,
            end: u64::MAX,
        }
    }
}

/// Boxed work source returned by [`Checker::items`].
pub type WorkSource<'a, T> = Box<dyn Iterator<Item = T> + Send + 'a>;

/// A verification policy run by [`CheckRunner`].
pub trait Checker: Send + Sync {
    /// Unit of work: a record id, a group id, or a coarser bucket.
    type Item: fmt::Display + Send;
    /// Finding categories produced by this checker.
    type Category: Category;

    /// Short name used in logs and snapshots.
    fn name(&self) -> &'static str;

    /// Enumerates the items within `range`. The iterator is consumed once.
    fn items(&self, range: IdRange) -> Result<WorkSource<'_, Self::Item>>;

    /// Verifies one item. An `Err` is recorded by the runner and never aborts
    /// the run.
    fn check_item(&self, item: &Self::Item) -> Result<MismatchReport<Self::Category>>;
}
