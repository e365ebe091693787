use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{AuditRecord, FollowUp};

/// Actor recorded on locally synthesized audit entries.
pub const LOCAL_ACTOR: &str = "demo-ui";

/// A local entry is considered confirmed by an authoritative entry with the
/// same assignee and actor whose timestamp is within this window. Client and
/// server clocks are close but not identical.
const MERGE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentState {
    Unassigned,
    Assigned(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOrigin {
    /// Optimistic local entry not yet seen in an authoritative read.
    Local,
    Authoritative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub record: AuditRecord,
    pub origin: HistoryOrigin,
}

/// Session-local view of who is assigned to what. Successful writes are
/// reflected here immediately; failed writes change nothing. Authoritative
/// reads are merged in later via [`AssignmentTracker::merged_history`].
#[derive(Debug, Default)]
pub struct AssignmentTracker {
    states: HashMap<String, AssignmentState>,
    // Newest first, per follow-up.
    local_history: HashMap<String, Vec<AuditRecord>>,
}

impl AssignmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the local view from authoritative follow-up data.
    pub fn observe(&mut self, followup: &FollowUp) {
        let state = match followup.assigned_to.as_deref() {
            Some(id) if !id.trim().is_empty() => AssignmentState::Assigned(id.to_string()),
            _ => AssignmentState::Unassigned,
        };
        self.states.insert(followup.followup_id.clone(), state);
    }

    pub fn state(&self, followup_id: &str) -> AssignmentState {
        self.states
            .get(followup_id)
            .cloned()
            .unwrap_or(AssignmentState::Unassigned)
    }

    pub fn is_assigned(&self, followup_id: &str) -> bool {
        matches!(self.state(followup_id), AssignmentState::Assigned(_))
    }

    /// Record a successful assignment write: flip the local state and
    /// synthesize an audit entry with the client clock and the actor that
    /// performed the write, without waiting for a data refresh. The actor
    /// must match what went into the authoritative row, or the entry will
    /// never be confirmed by a later read.
    pub fn record_success(
        &mut self,
        followup_id: &str,
        staff_id: &str,
        assigned_by: &str,
        now: DateTime<Utc>,
    ) -> AuditRecord {
        let prev = match self.state(followup_id) {
            AssignmentState::Assigned(id) => Some(id),
            AssignmentState::Unassigned => None,
        };
        self.states.insert(
            followup_id.to_string(),
            AssignmentState::Assigned(staff_id.to_string()),
        );

        let record = AuditRecord {
            followup_id: followup_id.to_string(),
            prev_assigned_to: prev,
            assigned_to: staff_id.to_string(),
            assigned_by: assigned_by.to_string(),
            assigned_at: now,
        };
        self.local_history
            .entry(followup_id.to_string())
            .or_default()
            .insert(0, record.clone());
        record
    }

    fn confirmed_by(local: &AuditRecord, authoritative: &[AuditRecord]) -> bool {
        authoritative.iter().any(|a| {
            a.assigned_to == local.assigned_to
                && a.assigned_by == local.assigned_by
                && (a.assigned_at - local.assigned_at).num_seconds().abs() <= MERGE_TOLERANCE_SECS
        })
    }

    /// Merge session-local entries with an authoritative audit read. Local
    /// entries come first (most recent first) and stay tagged `Local` until
    /// the authoritative list catches up, at which point the matching local
    /// entry is dropped instead of duplicated.
    pub fn merged_history(
        &self,
        followup_id: &str,
        authoritative: &[AuditRecord],
    ) -> Vec<HistoryEntry> {
        let mut merged = Vec::new();

        if let Some(local) = self.local_history.get(followup_id) {
            for record in local {
                if !Self::confirmed_by(record, authoritative) {
                    merged.push(HistoryEntry {
                        record: record.clone(),
                        origin: HistoryOrigin::Local,
                    });
                }
            }
        }

        merged.extend(authoritative.iter().map(|record| HistoryEntry {
            record: record.clone(),
            origin: HistoryOrigin::Authoritative,
        }));

        merged
    }
}
