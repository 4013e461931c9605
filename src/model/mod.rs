//! Record, group, and structure payload types.

mod group;
mod record;
mod structure;

pub use group::Group;
pub use record::{GroupKey, ProvenanceEntry, Record, RecordSpec, DEPRECATED_PREFIX, MAX_SPACEGROUP};
pub use structure::{Lattice, Site, Structure};
