use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{GroupKey, Record};
use crate::types::{GroupId, RecordId, Result, StrudexError};

/// A cluster of records equivalent to one canonical representative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Sequential id assigned by the registry.
    pub id: GroupId,
    /// Full copy of the representative member.
    pub canonical: Record,
    /// Ids of every member, canonical included.
    pub members: BTreeSet<RecordId>,
    /// Key shared by every member.
    pub group_key: GroupKey,
    /// Duplicated from the canonical for queries.
    pub composition_key: String,
    /// Duplicated from the canonical for queries.
    pub spacegroup: u16,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Group {
    /// Creates a singleton group around `canonical`.
    pub fn new(id: GroupId, canonical: Record) -> Self {
        let mut members = BTreeSet::new();
        members.insert(canonical.id);
        Self {
            id,
            group_key: canonical.group_key.clone(),
            composition_key: canonical.composition_key.clone(),
            spacegroup: canonical.spacegroup,
            members,
            canonical,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Number of members.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Id of the canonical record.
    pub fn canonical_id(&self) -> RecordId {
        self.canonical.id
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: RecordId) -> bool {
        self.members.contains(&id)
    }

    /// Whether the group contains only its canonical record.
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    pub(crate) fn add_member(&mut self, id: RecordId) -> bool {
        self.members.insert(id)
    }

    /// Switches the canonical pointer to `record`, which must already be a
    /// member with the same key. The member set is untouched.
    pub(crate) fn replace_canonical(&mut self, record: Record) -> Result<()> {
        if !self.contains(record.id) {
            return Err(StrudexError::Invalid(format!(
                "record {} is not a member of group {}",
                record.id, self.id
            )));
        }
        if record.group_key != self.group_key {
            return Err(StrudexError::Invalid(format!(
                "record {} key {} differs from group {} key {}",
                record.id, record.group_key, self.id, self.group_key
            )));
        }
        self.canonical = record;
        Ok(())
    }
}
