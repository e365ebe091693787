use std::collections::HashMap;
use std::fmt::Write;

use chrono::{Duration, NaiveDate};

use crate::models::{
    DashboardCounts, Provenance, RecentAssignment, SlaSummary, StaffWeekLoad, WeeklyActivity,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub count: i64,
}

/// Bucket event dates into consecutive days starting at `start`, filling
/// empty days with zero so the report always shows the full range.
pub fn bucket_by_day(dates: &[NaiveDate], start: NaiveDate, days: i64) -> Vec<DayBucket> {
    let mut counts: HashMap<NaiveDate, i64> = HashMap::new();
    for date in dates {
        *counts.entry(*date).or_insert(0) += 1;
    }

    (0..days)
        .map(|offset| {
            let date = start + Duration::days(offset);
            DayBucket {
                date,
                count: counts.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

pub fn build_dashboard_report(
    counts: &DashboardCounts,
    sla: Option<SlaSummary>,
    staff_loads: &[StaffWeekLoad],
    recent: &[RecentAssignment],
    weekly: Option<&WeeklyActivity>,
    week_start: NaiveDate,
    provenance: Provenance,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Radiology Follow-up Dashboard");
    let _ = writeln!(output, "Data source: {}", provenance.as_str());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Metrics");
    let _ = writeln!(output, "- Total scans: {}", counts.total_scans);
    let _ = writeln!(output, "- Pending follow-ups: {}", counts.pending);
    let _ = writeln!(output, "- Completed follow-ups: {}", counts.completed);
    let _ = writeln!(output, "- Overdue follow-ups: {}", counts.overdue);
    let _ = writeln!(
        output,
        "- Assignments this week: {}",
        counts.assignments_this_week
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Follow-up SLA");
    match sla {
        Some(sla) => {
            let _ = writeln!(output, "{:.1}% of due follow-ups met.", sla.pct_met);
        }
        None => {
            let _ = writeln!(output, "No SLA data available.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Staff Assignments This Week");
    if staff_loads.is_empty() {
        let _ = writeln!(output, "No assignments recorded this week.");
    } else {
        for load in staff_loads {
            let _ = writeln!(
                output,
                "- {} ({}): {} assignments",
                load.staff_name, load.staff_id, load.total_assignments
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Assignments");
    if recent.is_empty() {
        let _ = writeln!(output, "No assignments recorded yet.");
    } else {
        for entry in recent {
            let _ = writeln!(
                output,
                "- {} {} to {} by {} [{}]",
                entry.assigned_at.format("%d/%m/%Y %H:%M"),
                entry.patient_ref,
                entry.assigned_to,
                entry.assigned_by,
                entry.status.as_str()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Activity (from {week_start})");
    match weekly {
        Some(weekly) => {
            let _ = writeln!(
                output,
                "{} reports, {} follow-ups ({} completed, {} pending, {} overdue)",
                weekly.report_dates.len(),
                weekly.followup_dates.len(),
                weekly.completed,
                weekly.pending,
                weekly.overdue
            );
            let _ = writeln!(output);
            let _ = writeln!(output, "Reports per day:");
            for bucket in bucket_by_day(&weekly.report_dates, week_start, 7) {
                let _ = writeln!(output, "- {}: {}", bucket.date, bucket.count);
            }
            let _ = writeln!(output);
            let _ = writeln!(output, "Follow-ups created per day:");
            for bucket in bucket_by_day(&weekly.followup_dates, week_start, 7) {
                let _ = writeln!(output, "- {}: {}", bucket.date, bucket.count);
            }
        }
        None => {
            let _ = writeln!(output, "No weekly activity data available.");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, day).unwrap()
    }

    #[test]
    fn buckets_fill_the_whole_range() {
        let dates = vec![date(3), date(3), date(5)];
        let buckets = bucket_by_day(&dates, date(2), 7);
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0], DayBucket { date: date(2), count: 0 });
        assert_eq!(buckets[1], DayBucket { date: date(3), count: 2 });
        assert_eq!(buckets[3], DayBucket { date: date(5), count: 1 });
        assert_eq!(buckets[6], DayBucket { date: date(8), count: 0 });
    }

    #[test]
    fn dates_outside_the_range_are_ignored() {
        let dates = vec![date(1), date(20)];
        let buckets = bucket_by_day(&dates, date(2), 7);
        assert!(buckets.iter().all(|b| b.count == 0));
    }

    #[test]
    fn report_labels_provenance_and_sections() {
        let counts = DashboardCounts {
            total_scans: 42,
            pending: 7,
            completed: 30,
            overdue: 5,
            assignments_this_week: 3,
        };
        let loads = vec![StaffWeekLoad {
            staff_id: "S1".to_string(),
            staff_name: "Sarah Chen".to_string(),
            total_assignments: 3,
        }];
        let recent = vec![RecentAssignment {
            patient_ref: "NHS001001".to_string(),
            action_required: "Repeat chest CT".to_string(),
            assigned_to: "S1".to_string(),
            assigned_by: "demo-ui".to_string(),
            assigned_at: chrono::Utc::now(),
            status: crate::models::Status::Pending,
        }];
        let report = build_dashboard_report(
            &counts,
            Some(SlaSummary { pct_met: 87.5 }),
            &loads,
            &recent,
            None,
            date(3),
            Provenance::Fallback,
        );

        assert!(report.contains("Data source: fallback"));
        assert!(report.contains("Total scans: 42"));
        assert!(report.contains("87.5% of due follow-ups met."));
        assert!(report.contains("Sarah Chen (S1): 3 assignments"));
        assert!(report.contains("NHS001001 to S1 by demo-ui [Pending]"));
        assert!(report.contains("No weekly activity data available."));
    }

    #[test]
    fn report_handles_empty_aggregates() {
        let report = build_dashboard_report(
            &DashboardCounts::default(),
            None,
            &[],
            &[],
            None,
            date(3),
            Provenance::Primary,
        );
        assert!(report.contains("Data source: primary"));
        assert!(report.contains("No SLA data available."));
        assert!(report.contains("No assignments recorded this week."));
        assert!(report.contains("No assignments recorded yet."));
    }
}
