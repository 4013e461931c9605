//! Strudex: a deduplication index for scientific structural records.
//!
//! Records are grouped under a tolerance-based comparator by the
//! [`registry::GroupRegistry`], and the [`check`] framework re-verifies the
//! resulting index with a pool of workers.

#![warn(missing_docs)]

pub mod admin;
pub mod check;
pub mod compare;
pub mod logging;
pub mod model;
pub mod primitives;
pub mod registry;
pub mod store;
pub mod types;
