//! Shared identifiers and the crate-wide error type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sequential identifier of a persisted record.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

/// Sequential identifier of a group.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId(value)
    }
}

impl From<u64> for GroupId {
    fn from(value: u64) -> Self {
        GroupId(value)
    }
}

/// Error type shared by the registry, stores, and checkers.
#[derive(thiserror::Error, Debug)]
pub enum StrudexError {
    /// I/O failure while reading or writing persisted state.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Persisted state could not be encoded or decoded.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The lock service gave up after its configured retries.
    #[error("lock busy after {attempts} attempts")]
    LockBusy {
        /// Number of acquisition attempts made before giving up.
        attempts: u32,
    },
    /// A referenced record or group is missing from the store.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Kind of entity that was looked up.
        kind: &'static str,
        /// Raw identifier that was looked up.
        id: u64,
    },
    /// Caller supplied an invalid value.
    #[error("invalid argument: {0}")]
    Invalid(String),
    /// The comparison predicate or classifier failed on its input.
    #[error("comparator: {0}")]
    Comparator(String),
    /// Persisted state violates an internal invariant.
    #[error("corruption: {0}")]
    Corruption(String),
}

impl StrudexError {
    pub(crate) fn record_missing(id: RecordId) -> Self {
        StrudexError::NotFound {
            kind: "record",
            id: id.0,
        }
    }

    pub(crate) fn group_missing(id: GroupId) -> Self {
        StrudexError::NotFound {
            kind: "group",
            id: id.0,
        }
    }

    /// Returns true when retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StrudexError::LockBusy { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StrudexError>;
