use serde::Serialize;
use tracing::{info, warn};

use crate::registry::GroupRegistry;

use crate::admin::Result;

/// Outcome of a reconciliation sweep.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconcileReport {
    /// Ungrouped records found at the start of the sweep.
    pub examined: u64,
    /// Records that joined an existing group.
    pub joined: u64,
    /// Records that became the canonical of a new group.
    pub new_groups: u64,
    /// Records left ungrouped, with the reason.
    pub failures: Vec<String>,
}

/// Places every stored record that belongs to no group.
///
/// Records left behind by a busy registry lock end up here. A failure on one
/// record is reported and the sweep moves on.
///
/// # Errors
///
/// Returns an error if the ungrouped set cannot be computed.
pub fn reconcile(registry: &GroupRegistry) -> Result<ReconcileReport> {
    let ungrouped = registry.find_ungrouped()?;
    let mut report = ReconcileReport {
        examined: ungrouped.len() as u64,
        ..ReconcileReport::default()
    };
    for id in ungrouped {
        match registry.regroup(id) {
            Ok(outcome) if outcome.is_new_group => report.new_groups += 1,
            Ok(_) => report.joined += 1,
            Err(err) => {
                warn!(record = %id, error = %err, "admin.reconcile.failed");
                report.failures.push(format!("record {id}: {err}"));
            }
        }
    }
    info!(
        examined = report.examined,
        joined = report.joined,
        new_groups = report.new_groups,
        failed = report.failures.len(),
        "admin.reconcile.finished"
    );
    Ok(report)
}
