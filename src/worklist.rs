use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{FollowUp, Report, StaffMember, Status, WorklistRow};
use crate::triage;

pub const NO_ACTION: &str = "No action assigned";
pub const UNASSIGNED: &str = "Unassigned";

/// Join follow-ups with their reports and assignees into display rows.
/// Pure: the same collections always produce the same rows.
pub fn build_rows(
    followups: &[FollowUp],
    reports: &[Report],
    staff: &[StaffMember],
    today: NaiveDate,
) -> Vec<WorklistRow> {
    let reports_by_id: HashMap<&str, &Report> = reports
        .iter()
        .map(|r| (r.report_id.as_str(), r))
        .collect();
    let staff_by_id: HashMap<&str, &StaffMember> =
        staff.iter().map(|s| (s.staff_id.as_str(), s)).collect();

    followups
        .iter()
        .map(|f| {
            let report = f
                .report_id
                .as_deref()
                .and_then(|id| reports_by_id.get(id).copied());

            let action = if !f.action_required.trim().is_empty() {
                f.action_required.clone()
            } else {
                report
                    .and_then(|r| r.follow_up_instruction.clone())
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or_else(|| NO_ACTION.to_string())
            };

            // The raw assignee id is the most recent authoritative value, so
            // it is shown as-is even when it matches no staff record. The
            // resolved name rides along for views that want it.
            let (assigned, assignee_name) = match f.assigned_to.as_deref() {
                Some(id) if !id.trim().is_empty() => (
                    id.to_string(),
                    staff_by_id.get(id).map(|s| s.staff_name.clone()),
                ),
                _ => (UNASSIGNED.to_string(), None),
            };

            WorklistRow {
                followup_id: f.followup_id.clone(),
                patient_ref: f.patient_ref.clone(),
                status: f.status,
                action,
                priority: triage::derive_priority(f.due_date, today),
                assigned,
                assignee_name,
                due_date: f.due_date,
                scan_type: report.map(|r| r.scan_type.clone()),
                report_id: f.report_id.clone(),
            }
        })
        .collect()
}

/// Resolve a staff id to a display name, degrading to the raw id when the
/// member is unknown. Used by history and assignment views.
pub fn staff_display_name(staff: &[StaffMember], staff_id: &str) -> String {
    staff
        .iter()
        .find(|s| s.staff_id == staff_id)
        .map(|s| s.staff_name.clone())
        .unwrap_or_else(|| staff_id.to_string())
}

/// Case-insensitive worklist filtering over patient, action, and assignee,
/// with an optional status filter and an unassigned-only view.
pub fn filter_rows(
    rows: &[WorklistRow],
    search: &str,
    status: Option<Status>,
    unassigned_only: bool,
) -> Vec<WorklistRow> {
    let term = search.to_ascii_lowercase();
    rows.iter()
        .filter(|row| {
            let matches_search = term.is_empty()
                || row.patient_ref.to_ascii_lowercase().contains(&term)
                || row.action.to_ascii_lowercase().contains(&term)
                || row.assigned.to_ascii_lowercase().contains(&term);
            let matches_status = status.map_or(true, |s| row.status == s);
            let matches_assignment = !unassigned_only || row.assigned == UNASSIGNED;
            matches_search && matches_status && matches_assignment
        })
        .cloned()
        .collect()
}

/// Staff picker search over name, role, and team.
pub fn filter_staff(staff: &[StaffMember], search: &str) -> Vec<StaffMember> {
    let term = search.to_ascii_lowercase();
    if term.is_empty() {
        return staff.to_vec();
    }
    staff
        .iter()
        .filter(|s| {
            s.staff_name.to_ascii_lowercase().contains(&term)
                || s.role.to_ascii_lowercase().contains(&term)
                || s.team.to_ascii_lowercase().contains(&term)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, ReportStatus};
    use chrono::{Duration, Utc};

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn sample_followup(id: &str) -> FollowUp {
        FollowUp {
            followup_id: id.to_string(),
            patient_ref: "NHS001001".to_string(),
            scan_date: Some(today() - Duration::days(14)),
            action_required: "Repeat chest CT".to_string(),
            report_id: Some("R-100".to_string()),
            assigned_to: Some("S1".to_string()),
            status: Status::Pending,
            priority: Priority::Medium,
            due_date: Some(today() + Duration::days(2)),
        }
    }

    fn sample_report(id: &str) -> Report {
        Report {
            report_id: id.to_string(),
            patient_ref: "NHS001001".to_string(),
            scan_type: "CT Chest".to_string(),
            radiologist_id: Some("S2".to_string()),
            reported_at: Some(today() - Duration::days(14)),
            summary: "Nodule noted".to_string(),
            follow_up_instruction: Some("Refer to Respiratory".to_string()),
            status: ReportStatus::Open,
        }
    }

    fn sample_staff(id: &str, name: &str) -> StaffMember {
        StaffMember {
            staff_id: id.to_string(),
            staff_name: name.to_string(),
            role: "Radiologist".to_string(),
            team: "CT".to_string(),
            is_active: true,
        }
    }

    #[test]
    fn joins_report_and_derives_priority() {
        let rows = build_rows(
            &[sample_followup("FU-1")],
            &[sample_report("R-100")],
            &[sample_staff("S1", "Sarah Chen")],
            today(),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].scan_type.as_deref(), Some("CT Chest"));
        assert_eq!(rows[0].priority, Priority::Medium);
        assert_eq!(rows[0].action, "Repeat chest CT");
    }

    #[test]
    fn action_falls_back_to_report_instruction_then_default() {
        let mut f = sample_followup("FU-1");
        f.action_required = "  ".to_string();
        let rows = build_rows(&[f.clone()], &[sample_report("R-100")], &[], today());
        assert_eq!(rows[0].action, "Refer to Respiratory");

        f.report_id = None;
        let rows = build_rows(&[f], &[], &[], today());
        assert_eq!(rows[0].action, NO_ACTION);
    }

    #[test]
    fn missing_report_still_produces_a_row() {
        let mut f = sample_followup("FU-1");
        f.report_id = Some("R-999".to_string());
        let rows = build_rows(&[f], &[sample_report("R-100")], &[], today());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].scan_type, None);
    }

    #[test]
    fn unknown_assignee_shows_raw_id_not_unassigned() {
        let mut f = sample_followup("FU-1");
        f.assigned_to = Some("S999".to_string());
        let rows = build_rows(&[f], &[], &[sample_staff("S1", "Sarah Chen")], today());
        assert_eq!(rows[0].assigned, "S999");
        assert_eq!(rows[0].assignee_name, None);
    }

    #[test]
    fn known_assignee_still_displays_raw_id_with_resolved_name() {
        let rows = build_rows(
            &[sample_followup("FU-1")],
            &[],
            &[sample_staff("S1", "Sarah Chen")],
            today(),
        );
        assert_eq!(rows[0].assigned, "S1");
        assert_eq!(rows[0].assignee_name.as_deref(), Some("Sarah Chen"));
    }

    #[test]
    fn empty_assignee_shows_unassigned() {
        let mut f = sample_followup("FU-1");
        f.assigned_to = None;
        let rows = build_rows(&[f.clone()], &[], &[], today());
        assert_eq!(rows[0].assigned, UNASSIGNED);

        f.assigned_to = Some(String::new());
        let rows = build_rows(&[f], &[], &[], today());
        assert_eq!(rows[0].assigned, UNASSIGNED);
    }

    #[test]
    fn joining_twice_is_idempotent() {
        let followups = vec![sample_followup("FU-1"), sample_followup("FU-2")];
        let reports = vec![sample_report("R-100")];
        let staff = vec![sample_staff("S1", "Sarah Chen")];
        let today = today();
        let first = build_rows(&followups, &reports, &staff, today);
        let second = build_rows(&followups, &reports, &staff, today);
        assert_eq!(first, second);
    }

    #[test]
    fn staff_name_resolution_degrades_to_raw_id() {
        let staff = vec![sample_staff("S1", "Sarah Chen")];
        assert_eq!(staff_display_name(&staff, "S1"), "Sarah Chen");
        assert_eq!(staff_display_name(&staff, "S999"), "S999");
    }

    #[test]
    fn filter_matches_patient_action_or_assignee() {
        let rows = build_rows(
            &[sample_followup("FU-1")],
            &[sample_report("R-100")],
            &[],
            today(),
        );
        assert_eq!(filter_rows(&rows, "chest", None, false).len(), 1);
        assert_eq!(filter_rows(&rows, "nhs001", None, false).len(), 1);
        assert_eq!(filter_rows(&rows, "s1", None, false).len(), 1);
        assert!(filter_rows(&rows, "nomatch", None, false).is_empty());
        assert!(filter_rows(&rows, "", Some(Status::Completed), false).is_empty());
        assert_eq!(filter_rows(&rows, "", Some(Status::Pending), false).len(), 1);
    }

    #[test]
    fn unassigned_filter_keeps_only_unassigned_rows() {
        let mut open = sample_followup("FU-2");
        open.assigned_to = None;
        let rows = build_rows(&[sample_followup("FU-1"), open], &[], &[], today());

        let unassigned = filter_rows(&rows, "", None, true);
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].followup_id, "FU-2");
        assert_eq!(unassigned[0].assigned, UNASSIGNED);

        // Combines with the status filter.
        assert_eq!(filter_rows(&rows, "", Some(Status::Pending), true).len(), 1);
        assert!(filter_rows(&rows, "", Some(Status::Completed), true).is_empty());
    }

    #[test]
    fn staff_filter_searches_name_role_team() {
        let staff = vec![
            sample_staff("S1", "Sarah Chen"),
            sample_staff("S2", "James Okafor"),
        ];
        assert_eq!(filter_staff(&staff, "sarah").len(), 1);
        assert_eq!(filter_staff(&staff, "radiologist").len(), 2);
        assert_eq!(filter_staff(&staff, "").len(), 2);
    }
}
