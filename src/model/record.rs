use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::Structure;
use crate::types::{RecordId, Result, StrudexError};

/// Highest valid spacegroup number; 0 means "unknown".
pub const MAX_SPACEGROUP: u16 = 230;

/// Annotation prefix marking a record as deprecated.
pub const DEPRECATED_PREFIX: &str = "deprecated";

/// Coarse pre-filter key: records can only share a group when their keys match.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    /// Derives the key from a composition and a spacegroup number.
    pub fn new(composition: &str, spacegroup: u16) -> Self {
        GroupKey(format!("{composition}_{spacegroup}"))
    }

    /// Borrowed key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a record's append-only history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    /// Short action name (`ingested`, `remark`, ...).
    pub action: String,
    /// Free-form detail.
    pub detail: String,
    /// When the action happened.
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl ProvenanceEntry {
    pub(crate) fn now(action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            detail: detail.into(),
            at: OffsetDateTime::now_utc(),
        }
    }
}

/// Caller input for a new record. Everything else is derived at ingestion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordSpec {
    /// Structural payload.
    pub structure: Structure,
    /// Spacegroup number reported by the source, 0 when unknown.
    #[serde(default)]
    pub spacegroup: u16,
    /// Identifier in an external database, if any.
    #[serde(default)]
    pub external_id: Option<String>,
    /// Initial annotations.
    #[serde(default)]
    pub annotations: Vec<String>,
    /// Where the structure came from; recorded in provenance.
    #[serde(default)]
    pub source: Option<String>,
}

impl RecordSpec {
    /// Spec with only a payload and a spacegroup.
    pub fn new(structure: Structure, spacegroup: u16) -> Self {
        Self {
            structure,
            spacegroup,
            external_id: None,
            annotations: Vec::new(),
            source: None,
        }
    }

    /// Sets the external identifier.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Sets the provenance source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Checks the payload and metadata without allocating an id.
    pub fn validate(&self) -> Result<()> {
        self.structure.validate()?;
        if self.spacegroup > MAX_SPACEGROUP {
            return Err(StrudexError::Invalid(format!(
                "spacegroup {} exceeds {MAX_SPACEGROUP}",
                self.spacegroup
            )));
        }
        if let Some(external) = &self.external_id {
            if external.trim().is_empty() {
                return Err(StrudexError::Invalid("empty external id".into()));
            }
        }
        Ok(())
    }
}

/// A persisted structural record.
///
/// The id and payload never change after creation; annotations and provenance
/// only grow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Sequential id assigned by the registry.
    pub id: RecordId,
    /// Structural payload.
    pub structure: Structure,
    /// Reduced formula derived from the payload.
    pub composition_key: String,
    /// Spacegroup number, 0 when unknown.
    pub spacegroup: u16,
    /// True when no site is partially occupied.
    pub ordered: bool,
    /// Derived pre-filter key.
    pub group_key: GroupKey,
    /// Identifier in an external database, if any.
    #[serde(default)]
    pub external_id: Option<String>,
    /// Append-only remarks.
    #[serde(default)]
    pub annotations: Vec<String>,
    /// Append-only history.
    #[serde(default)]
    pub provenance: Vec<ProvenanceEntry>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Record {
    /// Validates `spec` and derives the record metadata.
    pub fn new(id: RecordId, spec: RecordSpec) -> Result<Self> {
        spec.validate()?;
        let composition_key = spec.structure.reduced_formula();
        let group_key = GroupKey::new(&composition_key, spec.spacegroup);
        let ordered = spec.structure.is_ordered();
        let detail = spec.source.unwrap_or_else(|| "direct".to_string());
        Ok(Self {
            id,
            ordered,
            composition_key,
            spacegroup: spec.spacegroup,
            group_key,
            structure: spec.structure,
            external_id: spec.external_id,
            annotations: spec.annotations,
            provenance: vec![ProvenanceEntry::now("ingested", detail)],
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// True when a deprecation tombstone has been appended.
    pub fn is_deprecated(&self) -> bool {
        self.annotations
            .iter()
            .any(|note| note.starts_with(DEPRECATED_PREFIX))
    }

    pub(crate) fn append_remark(&mut self, action: &str, remark: &str) {
        self.annotations.push(remark.to_string());
        self.provenance.push(ProvenanceEntry::now(action, remark));
    }
}
