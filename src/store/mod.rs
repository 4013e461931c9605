//! Persistence seam for records and groups.
//!
//! The registry and the checkers only talk to a [`RecordStore`]. Two
//! implementations ship with the crate: [`MemoryStore`] for embedding and
//! tests, and [`FileStore`], which snapshots a `MemoryStore` to a JSON file.

mod file;
mod memory;

pub use file::{FileStore, StoreOptions};
pub use memory::MemoryStore;

use crate::model::{Group, GroupKey, Record};
use crate::types::{GroupId, RecordId, Result, StrudexError};

/// Storage operations needed by the registry and the checkers.
///
/// Implementations must be safe to read concurrently. Writes to groups are
/// serialized by the registry lock; record writes may happen concurrently.
pub trait RecordStore: Send + Sync {
    /// Inserts or replaces a record.
    fn put_record(&self, record: &Record) -> Result<()>;

    /// Loads a record by id.
    fn record(&self, id: RecordId) -> Result<Option<Record>>;

    /// All record ids in ascending order.
    fn record_ids(&self) -> Result<Vec<RecordId>>;

    /// Highest record id ever stored, 0 when empty.
    fn max_record_id(&self) -> Result<u64>;

    /// Inserts or replaces a group.
    fn put_group(&self, group: &Group) -> Result<()>;

    /// Loads a group by id.
    fn group(&self, id: GroupId) -> Result<Option<Group>>;

    /// All group ids in ascending order.
    fn group_ids(&self) -> Result<Vec<GroupId>>;

    /// Highest group id ever stored, 0 when empty.
    fn max_group_id(&self) -> Result<u64>;

    /// Every group whose key equals `key`.
    fn groups_with_key(&self, key: &GroupKey) -> Result<Vec<Group>>;

    /// The group listing `id` as a member, if any.
    fn group_containing(&self, id: RecordId) -> Result<Option<GroupId>>;

    /// Makes buffered writes durable. A no-op for purely in-memory stores.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Loads a record or fails with `NotFound`.
pub fn require_record(store: &dyn RecordStore, id: RecordId) -> Result<Record> {
    store
        .record(id)?
        .ok_or_else(|| StrudexError::record_missing(id))
}

/// Loads a group or fails with `NotFound`.
pub fn require_group(store: &dyn RecordStore, id: GroupId) -> Result<Group> {
    store
        .group(id)?
        .ok_or_else(|| StrudexError::group_missing(id))
}
