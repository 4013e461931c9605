use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::model::Group;
use crate::store::RecordStore;
use crate::types::{GroupId, RecordId};

use crate::admin::Result;

const MAX_FINDINGS: usize = 32;

/// Specifies the depth of verification checks to perform.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyLevel {
    /// Group headers only: canonical key and canonical membership.
    Fast,
    /// Every member and record: partition and key consistency.
    Full,
}

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Non-critical issue, such as a record awaiting placement.
    Warning,
    /// Broken invariant.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Human-readable description of the issue.
    pub message: String,
}

impl VerifyFinding {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Warning,
            message: message.into(),
        }
    }
}

/// Statistics collected during the verification process.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Groups examined.
    pub groups_found: u64,
    /// Records examined (full level only).
    pub records_found: u64,
    /// Member references examined (full level only).
    pub member_refs: u64,
    /// Records that belong to no group (full level only).
    pub ungrouped_records: u64,
}

/// Complete report of a verification operation.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// The verification level that was performed.
    pub level: VerifyLevel,
    /// Whether no error-level finding was recorded.
    pub success: bool,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the data examined.
    pub counts: VerifyCounts,
}

/// Verifies the registry invariants of a store.
///
/// - `VerifyLevel::Fast`: each group's canonical carries the group key and is
///   one of its members.
/// - `VerifyLevel::Full`: additionally every member exists and carries the
///   group key, every record belongs to at most one group, and records in no
///   group are reported as warnings.
///
/// # Errors
///
/// Returns an error only if the store cannot be read.
pub fn verify(store: &dyn RecordStore, level: VerifyLevel) -> Result<VerifyReport> {
    let mut findings = Vec::new();
    let mut counts = VerifyCounts::default();
    let mut groups = Vec::new();

    for id in store.group_ids()? {
        match store.group(id)? {
            Some(group) => {
                counts.groups_found += 1;
                check_header(&group, &mut findings);
                groups.push(group);
            }
            None => push_error(&mut findings, format!("group {id} listed but unreadable")),
        }
    }

    if matches!(level, VerifyLevel::Full) {
        check_members(store, &groups, &mut findings, &mut counts)?;
        check_records(store, &mut findings, &mut counts)?;
    }

    Ok(VerifyReport {
        level,
        success: !findings
            .iter()
            .any(|finding| finding.severity == VerifySeverity::Error),
        findings,
        counts,
    })
}

fn check_header(group: &Group, findings: &mut Vec<VerifyFinding>) {
    let canonical = &group.canonical;
    if canonical.group_key != group.group_key {
        push_error(
            findings,
            format!(
                "group {} key {} differs from canonical {} key {}",
                group.id, group.group_key, canonical.id, canonical.group_key
            ),
        );
    }
    if !group.contains(canonical.id) {
        push_error(
            findings,
            format!("group {} canonical {} is not a member", group.id, canonical.id),
        );
    }
    if group.composition_key != canonical.composition_key
        || group.spacegroup != canonical.spacegroup
    {
        push_error(
            findings,
            format!("group {} metadata disagrees with its canonical", group.id),
        );
    }
}

fn check_members(
    store: &dyn RecordStore,
    groups: &[Group],
    findings: &mut Vec<VerifyFinding>,
    counts: &mut VerifyCounts,
) -> Result<()> {
    let mut owner: FxHashMap<RecordId, GroupId> = FxHashMap::default();
    for group in groups {
        for member_id in &group.members {
            counts.member_refs += 1;
            if let Some(previous) = owner.insert(*member_id, group.id) {
                push_error(
                    findings,
                    format!("record {member_id} is a member of groups {previous} and {}", group.id),
                );
            }
            match store.record(*member_id)? {
                Some(member) if member.group_key != group.group_key => push_error(
                    findings,
                    format!(
                        "record {member_id} key {} differs from group {} key {}",
                        member.group_key, group.id, group.group_key
                    ),
                ),
                Some(_) => {}
                None => push_error(
                    findings,
                    format!("group {} references missing record {member_id}", group.id),
                ),
            }
            if findings.len() >= MAX_FINDINGS {
                return Ok(());
            }
        }
    }
    Ok(())
}

fn check_records(
    store: &dyn RecordStore,
    findings: &mut Vec<VerifyFinding>,
    counts: &mut VerifyCounts,
) -> Result<()> {
    for id in store.record_ids()? {
        counts.records_found += 1;
        if store.group_containing(id)?.is_none() {
            counts.ungrouped_records += 1;
            push_finding(
                findings,
                VerifyFinding::warning(format!("record {id} belongs to no group")),
            );
        }
    }
    Ok(())
}

fn push_error(findings: &mut Vec<VerifyFinding>, message: impl Into<String>) {
    push_finding(findings, VerifyFinding::error(message.into()));
}

fn push_finding(findings: &mut Vec<VerifyFinding>, finding: VerifyFinding) {
    if findings.len() < MAX_FINDINGS {
        findings.push(finding);
    }
}
