use chrono::NaiveDate;

use crate::models::{
    AlertKind, DashboardCounts, Dataset, DerivedAlert, FollowUp, Priority, Status,
};

const SPECIALIST_KEYWORDS: [&str; 3] = ["oncology", "gastroenterology", "respiratory"];
const URGENT_KEYWORDS: [&str; 5] = ["urgent", "immediate", "critical", "emergency", "stat"];

/// Display priority from the due date alone. Overdue items are High, items
/// due within three days are Medium, everything else (including items with
/// no due date) is Low.
pub fn derive_priority(due_date: Option<NaiveDate>, today: NaiveDate) -> Priority {
    let Some(due) = due_date else {
        return Priority::Low;
    };
    let days_remaining = (due - today).num_days();
    if days_remaining < 0 {
        Priority::High
    } else if days_remaining <= 3 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

fn is_overdue(followup: &FollowUp, today: NaiveDate) -> bool {
    followup.status == Status::Overdue
        || followup
            .due_date
            .is_some_and(|due| due < today && followup.status != Status::Completed)
}

fn is_urgent(followup: &FollowUp) -> bool {
    followup.priority == Priority::High && followup.status == Status::Pending
}

fn alert_message(followup: &FollowUp) -> String {
    format!("Overdue follow-up: {}", followup.action_required)
}

/// One alert per follow-up whose status is Overdue or whose due date has
/// passed without completion.
pub fn overdue_alerts(followups: &[FollowUp], today: NaiveDate) -> Vec<DerivedAlert> {
    followups
        .iter()
        .filter(|f| is_overdue(f, today))
        .map(|f| DerivedAlert {
            id: format!("alert-{}", f.followup_id),
            followup_id: f.followup_id.clone(),
            patient_ref: f.patient_ref.clone(),
            message: alert_message(f),
            kind: AlertKind::Overdue,
            scan_date: f.scan_date,
        })
        .collect()
}

/// High-priority pending cases. Computed independently of the overdue set;
/// a follow-up may appear in both (they feed separate panels).
pub fn urgent_alerts(followups: &[FollowUp]) -> Vec<DerivedAlert> {
    followups
        .iter()
        .filter(|f| is_urgent(f))
        .map(|f| DerivedAlert {
            id: format!("alert-{}", f.followup_id),
            followup_id: f.followup_id.clone(),
            patient_ref: f.patient_ref.clone(),
            message: f.action_required.clone(),
            kind: AlertKind::Urgent,
            scan_date: f.scan_date,
        })
        .collect()
}

/// Total alert count. With `dedup` off this is the plain sum of the two
/// panels, so a follow-up that is both overdue and urgent counts twice;
/// that is the historical default. With `dedup` on, each follow-up counts
/// once.
pub fn total_alerts(followups: &[FollowUp], today: NaiveDate, dedup: bool) -> usize {
    if dedup {
        followups
            .iter()
            .filter(|f| is_overdue(f, today) || is_urgent(f))
            .count()
    } else {
        let overdue = followups.iter().filter(|f| is_overdue(f, today)).count();
        let urgent = followups.iter().filter(|f| is_urgent(f)).count();
        overdue + urgent
    }
}

fn day_word(n: i64) -> &'static str {
    if n == 1 {
        "day"
    } else {
        "days"
    }
}

/// Heuristic triage suggestion, used only when the server-side suggestion is
/// unavailable. Rule order matters: specialist pathway, overdue status,
/// due-soon, past-due, urgency keywords, then the standard default.
pub fn suggest(
    action: &str,
    due_date: Option<NaiveDate>,
    status: Status,
    today: NaiveDate,
) -> String {
    let action_lower = action.to_ascii_lowercase();
    let days = due_date.map(|due| (due - today).num_days());

    if SPECIALIST_KEYWORDS.iter().any(|k| action_lower.contains(k)) {
        if let Some(days) = days {
            if (0..=14).contains(&days) {
                return "High – Specialist pathway".to_string();
            }
        }
    }

    if status == Status::Overdue {
        return "High – Overdue status detected".to_string();
    }

    if let Some(days) = days {
        if (0..=7).contains(&days) {
            return format!("Medium – Due in {} {}", days, day_word(days));
        }
        if days < 0 {
            let late = days.abs();
            return format!("High – {} {} overdue", late, day_word(late));
        }
    }

    if URGENT_KEYWORDS.iter().any(|k| action_lower.contains(k)) {
        return "High – Urgent action detected".to_string();
    }

    "Low – Standard follow-up".to_string()
}

/// Dashboard counts computed from a raw dataset. Used only on the fallback
/// path; when the primary source is reachable the precomputed views win.
/// The fallback source carries no audit trail, so assignments-this-week is
/// always zero here.
pub fn derive_counts(dataset: &Dataset) -> DashboardCounts {
    let by_status = |status: Status| -> i64 {
        dataset
            .followups
            .iter()
            .filter(|f| f.status == status)
            .count() as i64
    };

    DashboardCounts {
        total_scans: dataset.reports.len() as i64,
        pending: by_status(Status::Pending),
        completed: by_status(Status::Completed),
        overdue: by_status(Status::Overdue),
        assignments_this_week: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn followup(status: Status, priority: Priority, due_in_days: Option<i64>) -> FollowUp {
        FollowUp {
            followup_id: "FU-001".to_string(),
            patient_ref: "NHS001001".to_string(),
            scan_date: Some(today() - Duration::days(30)),
            action_required: "Repeat chest CT".to_string(),
            report_id: None,
            assigned_to: None,
            status,
            priority,
            due_date: due_in_days.map(|d| today() + Duration::days(d)),
        }
    }

    #[test]
    fn priority_bands_partition_day_counts() {
        let today = today();
        assert_eq!(derive_priority(Some(today - Duration::days(1)), today), Priority::High);
        assert_eq!(derive_priority(Some(today), today), Priority::Medium);
        assert_eq!(derive_priority(Some(today + Duration::days(3)), today), Priority::Medium);
        assert_eq!(derive_priority(Some(today + Duration::days(4)), today), Priority::Low);
        assert_eq!(derive_priority(None, today), Priority::Low);
    }

    #[test]
    fn priority_is_monotonic_in_days_remaining() {
        let today = today();
        let mut last = Priority::High;
        for days in -10..30 {
            let p = derive_priority(Some(today + Duration::days(days)), today);
            assert!(p <= last, "priority rose as days remaining grew");
            last = p;
        }
    }

    #[test]
    fn due_in_two_days_pending_is_medium() {
        assert_eq!(
            derive_priority(Some(today() + Duration::days(2)), today()),
            Priority::Medium
        );
    }

    #[test]
    fn past_due_uncompleted_is_high_and_alerted() {
        let today = today();
        for status in [Status::Pending, Status::Overdue, Status::Unknown] {
            let f = followup(status, Priority::Low, Some(-2));
            assert_eq!(derive_priority(f.due_date, today), Priority::High);
            assert!(!overdue_alerts(&[f], today).is_empty());
        }
    }

    #[test]
    fn completed_past_due_is_not_alerted_unless_flagged_overdue() {
        let today = today();
        let completed = followup(Status::Completed, Priority::Low, Some(-5));
        assert!(overdue_alerts(&[completed], today).is_empty());

        // Explicit Overdue status always alerts, whatever the due date says.
        let flagged = followup(Status::Overdue, Priority::Low, Some(10));
        assert_eq!(overdue_alerts(&[flagged], today).len(), 1);
    }

    #[test]
    fn overdue_alert_carries_action_text() {
        let today = today();
        let mut f = followup(Status::Overdue, Priority::Low, Some(-1));
        f.action_required = "Refer to Oncology".to_string();
        let alerts = overdue_alerts(&[f], today);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Overdue);
        assert!(alerts[0].message.contains("Refer to Oncology"));
        assert_eq!(alerts[0].id, "alert-FU-001");
    }

    #[test]
    fn urgent_requires_high_priority_and_pending() {
        assert_eq!(urgent_alerts(&[followup(Status::Pending, Priority::High, Some(5))]).len(), 1);
        assert!(urgent_alerts(&[followup(Status::Pending, Priority::Medium, Some(5))]).is_empty());
        assert!(urgent_alerts(&[followup(Status::Overdue, Priority::High, Some(5))]).is_empty());
    }

    #[test]
    fn legacy_total_double_counts_and_dedup_does_not() {
        let today = today();
        // High priority, pending, past due: urgent and overdue at once.
        let both = followup(Status::Pending, Priority::High, Some(-1));
        let items = vec![both];
        assert_eq!(total_alerts(&items, today, false), 2);
        assert_eq!(total_alerts(&items, today, true), 1);
    }

    #[test]
    fn specialist_keyword_beats_generic_rules() {
        let today = today();
        let due = Some(today + Duration::days(10));
        assert_eq!(
            suggest("Refer to Oncology", due, Status::Pending, today),
            "High – Specialist pathway"
        );
        // Same date without the keyword falls through to the default band.
        assert_eq!(
            suggest("Routine review", due, Status::Pending, today),
            "Low – Standard follow-up"
        );
    }

    #[test]
    fn specialist_keyword_outside_window_defers() {
        let today = today();
        assert_eq!(
            suggest(
                "Refer to Gastroenterology",
                Some(today + Duration::days(20)),
                Status::Pending,
                today
            ),
            "Low – Standard follow-up"
        );
        // Past due with a specialist keyword: the overdue rules take over.
        assert_eq!(
            suggest(
                "Refer to Gastroenterology",
                Some(today - Duration::days(3)),
                Status::Pending,
                today
            ),
            "High – 3 days overdue"
        );
    }

    #[test]
    fn overdue_status_wins_over_due_soon() {
        let today = today();
        assert_eq!(
            suggest("Review scan", Some(today + Duration::days(2)), Status::Overdue, today),
            "High – Overdue status detected"
        );
    }

    #[test]
    fn due_soon_and_past_due_wording() {
        let today = today();
        assert_eq!(
            suggest("Review scan", Some(today + Duration::days(1)), Status::Pending, today),
            "Medium – Due in 1 day"
        );
        assert_eq!(
            suggest("Review scan", Some(today + Duration::days(6)), Status::Pending, today),
            "Medium – Due in 6 days"
        );
        assert_eq!(
            suggest("Review scan", Some(today - Duration::days(1)), Status::Pending, today),
            "High – 1 day overdue"
        );
    }

    #[test]
    fn urgency_keywords_fire_without_due_date() {
        let today = today();
        assert_eq!(
            suggest("URGENT: discuss at MDT", None, Status::Pending, today),
            "High – Urgent action detected"
        );
        assert_eq!(
            suggest("Routine review", None, Status::Pending, today),
            "Low – Standard follow-up"
        );
    }

    #[test]
    fn derived_counts_mirror_dataset() {
        let dataset = Dataset {
            followups: vec![
                followup(Status::Pending, Priority::Low, None),
                followup(Status::Completed, Priority::Low, None),
                followup(Status::Overdue, Priority::Low, None),
                followup(Status::Unknown, Priority::Low, None),
            ],
            reports: Vec::new(),
            staff: Vec::new(),
        };
        let counts = derive_counts(&dataset);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.overdue, 1);
        assert_eq!(counts.total_scans, 0);
        assert_eq!(counts.assignments_this_week, 0);
    }
}
