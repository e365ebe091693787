use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Follow-up lifecycle status, normalized at ingestion. Raw values arrive in
/// mixed casings from both sources; anything unrecognized becomes `Unknown`
/// rather than silently matching a known state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Completed,
    Overdue,
    Unknown,
}

impl Status {
    pub fn parse(raw: &str) -> Status {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Status::Pending,
            "completed" => Status::Completed,
            "overdue" => Status::Overdue,
            _ => Status::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Completed => "Completed",
            Status::Overdue => "Overdue",
            Status::Unknown => "Unknown",
        }
    }
}

/// Ordered so that fewer days remaining never yields a lower priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn parse(raw: &str) -> Priority {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Priority::High,
            "medium" => Priority::Medium,
            _ => Priority::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Open,
    Closed,
    Unknown,
}

impl ReportStatus {
    pub fn parse(raw: &str) -> ReportStatus {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => ReportStatus::Open,
            "closed" => ReportStatus::Closed,
            _ => ReportStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "open",
            ReportStatus::Closed => "closed",
            ReportStatus::Unknown => "unknown",
        }
    }
}

/// Which source a dataset actually came from. Every consumer prints this so
/// fallback data is never mislabeled as live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Primary,
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Primary => "primary",
            Provenance::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub followup_id: String,
    pub patient_ref: String,
    pub scan_date: Option<NaiveDate>,
    pub action_required: String,
    pub report_id: Option<String>,
    pub assigned_to: Option<String>,
    pub status: Status,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_id: String,
    pub patient_ref: String,
    pub scan_type: String,
    pub radiologist_id: Option<String>,
    pub reported_at: Option<NaiveDate>,
    pub summary: String,
    pub follow_up_instruction: Option<String>,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub staff_id: String,
    pub staff_name: String,
    pub role: String,
    pub team: String,
    pub is_active: bool,
}

/// One append-only assignment audit row. `assigned_by` is the acting
/// identity; locally synthesized entries use [`crate::assignment::LOCAL_ACTOR`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub followup_id: String,
    pub prev_assigned_to: Option<String>,
    pub assigned_to: String,
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Overdue,
    Urgent,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Overdue => "overdue",
            AlertKind::Urgent => "urgent",
        }
    }
}

/// Computed per request from follow-up state; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedAlert {
    pub id: String,
    pub followup_id: String,
    pub patient_ref: String,
    pub message: String,
    pub kind: AlertKind,
    pub scan_date: Option<NaiveDate>,
}

/// Denormalized worklist row: follow-up joined with its report and assignee,
/// plus derived fields. Rebuilt on every refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct WorklistRow {
    pub followup_id: String,
    pub patient_ref: String,
    pub status: Status,
    pub action: String,
    pub priority: Priority,
    pub assigned: String,
    /// Resolved staff name when the assignee id matches a known member.
    pub assignee_name: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub scan_type: Option<String>,
    pub report_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub followups: Vec<FollowUp>,
    pub reports: Vec<Report>,
    pub staff: Vec<StaffMember>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.followups.is_empty() && self.reports.is_empty() && self.staff.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardCounts {
    pub total_scans: i64,
    pub pending: i64,
    pub completed: i64,
    pub overdue: i64,
    pub assignments_this_week: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaSummary {
    pub pct_met: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaffWeekLoad {
    pub staff_id: String,
    pub staff_name: String,
    pub total_assignments: i64,
}

#[derive(Debug, Clone)]
pub struct RecentAssignment {
    pub patient_ref: String,
    pub action_required: String,
    pub assigned_to: String,
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
    pub status: Status,
}

/// Raw material for the weekly activity report: event dates inside the
/// requested window, bucketed per day by the report builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeeklyActivity {
    pub report_dates: Vec<NaiveDate>,
    pub followup_dates: Vec<NaiveDate>,
    pub completed: i64,
    pub pending: i64,
    pub overdue: i64,
}

/// One row of the patient EHR summary view: demographics plus per-patient
/// record counts, precomputed server-side.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientSummary {
    pub patient_id: String,
    pub nhs_number: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<NaiveDate>,
    pub sex: String,
    pub gp_practice: String,
    pub allergies_count: i64,
    pub medications_count: i64,
    pub conditions_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allergy {
    pub patient_id: String,
    pub allergy_name: String,
    pub severity: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Medication {
    pub patient_id: String,
    pub drug_name: String,
    pub dose: String,
    pub frequency: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub patient_id: String,
    pub condition_name: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewCounts {
    pub followups: i64,
    pub reports: i64,
    pub staff: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_normalizes_casing() {
        assert_eq!(Status::parse("Pending"), Status::Pending);
        assert_eq!(Status::parse("overdue"), Status::Overdue);
        assert_eq!(Status::parse(" COMPLETED "), Status::Completed);
    }

    #[test]
    fn unrecognized_status_is_unknown() {
        // "overbyed" is a real typo observed in upstream data.
        assert_eq!(Status::parse("overbyed"), Status::Unknown);
        assert_eq!(Status::parse(""), Status::Unknown);
    }

    #[test]
    fn priority_ordering_is_monotonic() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
    }
}
