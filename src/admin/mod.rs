#![forbid(unsafe_code)]

//! Store administration and maintenance utilities.
//!
//! This module provides the operator-facing functions behind the CLI:
//! invariant verification, statistics reporting, reconciliation of ungrouped
//! records, and a single entry point for the bundled checkers.

mod check;
mod error;
mod options;
mod reconcile;
mod stats;
mod util;
mod verify;

/// Runs a bundled checker by kind.
pub use check::{run_check, CheckKind};

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// Configuration options for opening a store in admin mode.
pub use options::AdminOpenOptions;

/// Places records that belong to no group.
pub use reconcile::{reconcile, ReconcileReport};

/// Statistics collection and reporting.
pub use stats::{stats, StatsReport};

/// Registry invariant verification.
///
/// Verifies group headers, membership and key consistency, and reports any
/// issues found.
pub use verify::{verify, VerifyCounts, VerifyFinding, VerifyLevel, VerifyReport, VerifySeverity};

/// Checker run configuration.
pub use crate::check::CheckOptions;

/// Utility functions for opening a store and its registry.
pub use util::{open_registry, open_store, RegistryHandle};
