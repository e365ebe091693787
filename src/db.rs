use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    Allergy, AuditRecord, Condition, DashboardCounts, Dataset, FollowUp, Medication,
    PatientSummary, PreviewCounts, Priority, RecentAssignment, Report, ReportStatus, SlaSummary,
    StaffMember, StaffWeekLoad, Status, WeeklyActivity,
};

const FETCH_LIMIT: i64 = 500;
pub const HISTORY_LIMIT: i64 = 20;
const RECENT_LIMIT: i64 = 5;

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS radassist",
    r#"
    CREATE TABLE IF NOT EXISTS radassist.staff (
        staff_id TEXT PRIMARY KEY,
        staff_name TEXT NOT NULL,
        role TEXT NOT NULL,
        team TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS radassist.reports (
        report_id TEXT PRIMARY KEY,
        patient_ref TEXT NOT NULL,
        scan_type TEXT NOT NULL,
        radiologist_id TEXT,
        reported_at DATE,
        summary TEXT NOT NULL DEFAULT '',
        follow_up_instruction TEXT,
        status TEXT NOT NULL DEFAULT 'open',
        closed_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS radassist.followups (
        followup_id TEXT PRIMARY KEY,
        patient_ref TEXT NOT NULL,
        scan_date DATE,
        action_required TEXT NOT NULL DEFAULT '',
        report_id TEXT,
        assigned_to TEXT,
        status TEXT,
        priority TEXT,
        due_date DATE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS radassist.assignments_audit (
        id UUID PRIMARY KEY,
        followup_id TEXT NOT NULL,
        prev_assigned_to TEXT,
        assigned_to TEXT NOT NULL,
        assigned_by TEXT NOT NULL,
        assigned_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS radassist.radiologist_assignment_audit (
        id UUID PRIMARY KEY,
        report_id TEXT NOT NULL,
        old_radiologist_id TEXT,
        new_radiologist_id TEXT,
        changed_by TEXT NOT NULL,
        changed_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS radassist.tickets (
        ticket_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        description TEXT NOT NULL,
        priority TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'Open',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS radassist.patients (
        patient_id TEXT PRIMARY KEY,
        nhs_number TEXT NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        dob DATE,
        sex TEXT NOT NULL DEFAULT '',
        gp_practice TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS radassist.allergies (
        id UUID PRIMARY KEY,
        patient_id TEXT NOT NULL,
        allergy_name TEXT NOT NULL,
        severity TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS radassist.medications (
        id UUID PRIMARY KEY,
        patient_id TEXT NOT NULL,
        drug_name TEXT NOT NULL,
        dose TEXT NOT NULL DEFAULT '',
        frequency TEXT NOT NULL DEFAULT '',
        active BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS radassist.conditions (
        id UUID PRIMARY KEY,
        patient_id TEXT NOT NULL,
        condition_name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE OR REPLACE VIEW radassist.v_patient_ehr_summary AS
    SELECT
        p.patient_id,
        p.nhs_number,
        p.first_name,
        p.last_name,
        p.dob,
        p.sex,
        p.gp_practice,
        (SELECT count(*) FROM radassist.allergies a
         WHERE a.patient_id = p.patient_id) AS allergies_count,
        (SELECT count(*) FROM radassist.medications m
         WHERE m.patient_id = p.patient_id) AS medications_count,
        (SELECT count(*) FROM radassist.conditions c
         WHERE c.patient_id = p.patient_id) AS conditions_count
    FROM radassist.patients p
    "#,
    r#"
    CREATE OR REPLACE VIEW radassist.v_dashboard_counts AS
    SELECT
        (SELECT count(*) FROM radassist.reports) AS total_scans,
        count(*) FILTER (WHERE lower(coalesce(status, '')) = 'pending') AS pending,
        count(*) FILTER (WHERE lower(coalesce(status, '')) = 'completed') AS completed,
        count(*) FILTER (WHERE lower(coalesce(status, '')) = 'overdue') AS overdue
    FROM radassist.followups
    "#,
    r#"
    CREATE OR REPLACE VIEW radassist.v_followups_sla AS
    SELECT CASE
        WHEN count(*) = 0 THEN NULL
        ELSE (100.0 * count(*) FILTER (WHERE lower(coalesce(status, '')) = 'completed')
              / count(*))::float8
    END AS pct_met
    FROM radassist.followups
    WHERE due_date < CURRENT_DATE
    "#,
    r#"
    CREATE OR REPLACE VIEW radassist.v_assignments_total_this_week AS
    SELECT count(*) AS assignments
    FROM radassist.assignments_audit
    WHERE assigned_at >= date_trunc('week', now())
    "#,
    r#"
    CREATE OR REPLACE VIEW radassist.v_assignments_by_staff_week AS
    SELECT
        coalesce(s.staff_name, a.assigned_to) AS staff,
        a.assigned_to AS staff_id,
        count(*) AS total_assignments
    FROM radassist.assignments_audit a
    LEFT JOIN radassist.staff s ON s.staff_id = a.assigned_to
    WHERE a.assigned_at >= date_trunc('week', now())
    GROUP BY coalesce(s.staff_name, a.assigned_to), a.assigned_to
    "#,
    r#"
    CREATE OR REPLACE VIEW radassist.v_assignments_recent AS
    SELECT
        f.patient_ref,
        f.action_required,
        a.assigned_to,
        a.assigned_by,
        a.assigned_at,
        coalesce(f.status, 'pending') AS status
    FROM radassist.assignments_audit a
    JOIN radassist.followups f ON f.followup_id = a.followup_id
    ORDER BY a.assigned_at DESC
    LIMIT 50
    "#,
];

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("failed to apply schema statement")?;
    }
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let staff = vec![
        ("S1", "Sarah Chen", "Radiologist", "CT"),
        ("S2", "James Okafor", "Radiologist", "MRI"),
        ("S3", "Priya Nair", "Reporting Radiographer", "X-Ray"),
        ("S4", "Tom Whitfield", "Clinical Coordinator", "Follow-up"),
    ];

    for (id, name, role, team) in staff {
        sqlx::query(
            r#"
            INSERT INTO radassist.staff (staff_id, staff_name, role, team, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (staff_id) DO UPDATE
            SET staff_name = EXCLUDED.staff_name, role = EXCLUDED.role, team = EXCLUDED.team
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(role)
        .bind(team)
        .execute(pool)
        .await?;
    }

    let today = Utc::now().date_naive();
    let reports = vec![
        (
            "R-1001",
            "NHS001001",
            "CT Chest",
            Some("S1"),
            today - Duration::days(12),
            "8mm pulmonary nodule in right upper lobe",
            Some("Repeat CT chest in 3 months"),
            "open",
        ),
        (
            "R-1002",
            "NHS001002",
            "MRI Brain",
            Some("S2"),
            today - Duration::days(8),
            "No acute intracranial abnormality",
            None,
            "closed",
        ),
        (
            "R-1003",
            "NHS001003",
            "Abdominal Ultrasound",
            None,
            today - Duration::days(5),
            "Suspicious hepatic lesion, further characterisation required",
            Some("Refer to Gastroenterology"),
            "open",
        ),
    ];

    for (id, patient, scan_type, radiologist, reported_at, summary, instruction, status) in reports
    {
        sqlx::query(
            r#"
            INSERT INTO radassist.reports
            (report_id, patient_ref, scan_type, radiologist_id, reported_at, summary,
             follow_up_instruction, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (report_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(patient)
        .bind(scan_type)
        .bind(radiologist)
        .bind(reported_at)
        .bind(summary)
        .bind(instruction)
        .bind(status)
        .execute(pool)
        .await?;
    }

    let followups = vec![
        (
            "FU-2001",
            "NHS001001",
            today - Duration::days(12),
            "Repeat CT chest in 3 months",
            Some("R-1001"),
            Some("S1"),
            "pending",
            "Medium",
            Some(today + Duration::days(2)),
        ),
        (
            "FU-2002",
            "NHS001003",
            today - Duration::days(5),
            "Refer to Gastroenterology",
            Some("R-1003"),
            None,
            "pending",
            "High",
            Some(today + Duration::days(10)),
        ),
        (
            "FU-2003",
            "NHS001004",
            today - Duration::days(30),
            "Urgent biopsy follow-up",
            None,
            Some("S4"),
            "overdue",
            "High",
            Some(today - Duration::days(7)),
        ),
        (
            "FU-2004",
            "NHS001002",
            today - Duration::days(8),
            "Discharge letter to GP",
            Some("R-1002"),
            Some("S3"),
            "completed",
            "Low",
            Some(today - Duration::days(1)),
        ),
    ];

    let patients = vec![
        ("NHS001001", "4857773456", "Margaret", "Hughes", "1954-03-22", "F", "Riverside Surgery"),
        ("NHS001002", "9434765919", "David", "Armstrong", "1967-11-05", "M", "Hillcrest Medical"),
        ("NHS001003", "6203948571", "Amina", "Khalid", "1979-07-30", "F", "Riverside Surgery"),
        ("NHS001004", "3758291046", "Peter", "Lindqvist", "1948-01-12", "M", "Oakfield Practice"),
    ];

    for (id, nhs, first, last, dob, sex, gp) in patients {
        sqlx::query(
            r#"
            INSERT INTO radassist.patients
            (patient_id, nhs_number, first_name, last_name, dob, sex, gp_practice)
            VALUES ($1, $2, $3, $4, $5::date, $6, $7)
            ON CONFLICT (patient_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(nhs)
        .bind(first)
        .bind(last)
        .bind(dob)
        .bind(sex)
        .bind(gp)
        .execute(pool)
        .await?;
    }

    let allergies = vec![
        ("NHS001001", "Penicillin", "Severe"),
        ("NHS001001", "Iodinated contrast", "Moderate"),
        ("NHS001003", "Latex", "Mild"),
    ];
    for (patient_id, name, severity) in allergies {
        sqlx::query(
            r#"
            INSERT INTO radassist.allergies (id, patient_id, allergy_name, severity)
            SELECT $1, $2, $3, $4
            WHERE NOT EXISTS (
                SELECT 1 FROM radassist.allergies
                WHERE patient_id = $2 AND allergy_name = $3
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(name)
        .bind(severity)
        .execute(pool)
        .await?;
    }

    let medications = vec![
        ("NHS001001", "Amlodipine", "5mg", "Once daily", true),
        ("NHS001002", "Metformin", "500mg", "Twice daily", true),
        ("NHS001004", "Warfarin", "3mg", "Once daily", false),
    ];
    for (patient_id, drug, dose, frequency, active) in medications {
        sqlx::query(
            r#"
            INSERT INTO radassist.medications (id, patient_id, drug_name, dose, frequency, active)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE NOT EXISTS (
                SELECT 1 FROM radassist.medications
                WHERE patient_id = $2 AND drug_name = $3
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(drug)
        .bind(dose)
        .bind(frequency)
        .bind(active)
        .execute(pool)
        .await?;
    }

    let conditions = vec![
        ("NHS001001", "Hypertension", "Chronic"),
        ("NHS001002", "Type 2 diabetes", "Chronic"),
        ("NHS001003", "Hepatic lesion under investigation", "Active"),
    ];
    for (patient_id, name, status) in conditions {
        sqlx::query(
            r#"
            INSERT INTO radassist.conditions (id, patient_id, condition_name, status)
            SELECT $1, $2, $3, $4
            WHERE NOT EXISTS (
                SELECT 1 FROM radassist.conditions
                WHERE patient_id = $2 AND condition_name = $3
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(name)
        .bind(status)
        .execute(pool)
        .await?;
    }

    for (id, patient, scan_date, action, report_id, assigned_to, status, priority, due_date) in
        followups
    {
        sqlx::query(
            r#"
            INSERT INTO radassist.followups
            (followup_id, patient_ref, scan_date, action_required, report_id, assigned_to,
             status, priority, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (followup_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(patient)
        .bind(scan_date)
        .bind(action)
        .bind(report_id)
        .bind(assigned_to)
        .bind(status)
        .bind(priority)
        .bind(due_date)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn followup_from_row(row: &PgRow) -> FollowUp {
    let status: Option<String> = row.get("status");
    let priority: Option<String> = row.get("priority");
    FollowUp {
        followup_id: row.get("followup_id"),
        patient_ref: row.get("patient_ref"),
        scan_date: row.get("scan_date"),
        action_required: row.get("action_required"),
        report_id: row.get("report_id"),
        assigned_to: row.get("assigned_to"),
        status: Status::parse(status.as_deref().unwrap_or("")),
        priority: Priority::parse(priority.as_deref().unwrap_or("")),
        due_date: row.get("due_date"),
    }
}

pub async fn fetch_followups(pool: &PgPool) -> anyhow::Result<Vec<FollowUp>> {
    let rows = sqlx::query(
        "SELECT followup_id, patient_ref, scan_date, action_required, report_id, \
         assigned_to, status, priority, due_date \
         FROM radassist.followups ORDER BY created_at DESC LIMIT $1",
    )
    .bind(FETCH_LIMIT)
    .fetch_all(pool)
    .await
    .context("failed to fetch follow-ups")?;

    Ok(rows.iter().map(followup_from_row).collect())
}

pub async fn fetch_reports(pool: &PgPool) -> anyhow::Result<Vec<Report>> {
    let rows = sqlx::query(
        "SELECT report_id, patient_ref, scan_type, radiologist_id, reported_at, summary, \
         follow_up_instruction, status \
         FROM radassist.reports ORDER BY created_at DESC LIMIT $1",
    )
    .bind(FETCH_LIMIT)
    .fetch_all(pool)
    .await
    .context("failed to fetch reports")?;

    Ok(rows
        .iter()
        .map(|row| {
            let status: String = row.get("status");
            Report {
                report_id: row.get("report_id"),
                patient_ref: row.get("patient_ref"),
                scan_type: row.get("scan_type"),
                radiologist_id: row.get("radiologist_id"),
                reported_at: row.get("reported_at"),
                summary: row.get("summary"),
                follow_up_instruction: row.get("follow_up_instruction"),
                status: ReportStatus::parse(&status),
            }
        })
        .collect())
}

fn staff_from_row(row: &PgRow) -> StaffMember {
    StaffMember {
        staff_id: row.get("staff_id"),
        staff_name: row.get("staff_name"),
        role: row.get("role"),
        team: row.get("team"),
        is_active: row.get("is_active"),
    }
}

pub async fn fetch_staff(pool: &PgPool) -> anyhow::Result<Vec<StaffMember>> {
    let rows = sqlx::query(
        "SELECT staff_id, staff_name, role, team, is_active \
         FROM radassist.staff ORDER BY created_at DESC LIMIT $1",
    )
    .bind(FETCH_LIMIT)
    .fetch_all(pool)
    .await
    .context("failed to fetch staff")?;

    Ok(rows.iter().map(staff_from_row).collect())
}

/// Active staff for the assignment picker, ordered by name.
pub async fn fetch_active_staff(pool: &PgPool) -> anyhow::Result<Vec<StaffMember>> {
    let rows = sqlx::query(
        "SELECT staff_id, staff_name, role, team, is_active \
         FROM radassist.staff WHERE is_active ORDER BY staff_name LIMIT 50",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch active staff")?;

    Ok(rows.iter().map(staff_from_row).collect())
}

/// Fetch all three collections concurrently. Any single failure fails the
/// whole attempt; partial success is not modeled, the source selector
/// degrades to the fallback tier instead.
pub async fn fetch_dataset(pool: &PgPool) -> anyhow::Result<Dataset> {
    let (followups, reports, staff) = tokio::try_join!(
        fetch_followups(pool),
        fetch_reports(pool),
        fetch_staff(pool),
    )?;
    Ok(Dataset {
        followups,
        reports,
        staff,
    })
}

/// Assign a follow-up to a staff member. The follow-up update is the
/// authoritative write; the audit append is best-effort and an audit failure
/// never fails the assignment. A blank status is promoted to pending so the
/// row shows up in pending views after assignment.
pub async fn assign_followup(
    pool: &PgPool,
    followup_id: &str,
    staff_id: &str,
    assigned_by: &str,
) -> anyhow::Result<AuditRecord> {
    let row = sqlx::query("SELECT assigned_to FROM radassist.followups WHERE followup_id = $1")
        .bind(followup_id)
        .fetch_optional(pool)
        .await
        .context("failed to look up follow-up")?
        .with_context(|| format!("no follow-up with id {followup_id}"))?;
    let prev_assigned_to: Option<String> = row.get("assigned_to");

    sqlx::query(
        r#"
        UPDATE radassist.followups
        SET assigned_to = $2,
            status = CASE WHEN status IS NULL OR btrim(status) = '' THEN 'pending' ELSE status END,
            updated_at = now()
        WHERE followup_id = $1
        "#,
    )
    .bind(followup_id)
    .bind(staff_id)
    .execute(pool)
    .await
    .context("failed to update follow-up assignment")?;

    let assigned_at = Utc::now();
    let audit_result = sqlx::query(
        r#"
        INSERT INTO radassist.assignments_audit
        (id, followup_id, prev_assigned_to, assigned_to, assigned_by, assigned_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(followup_id)
    .bind(&prev_assigned_to)
    .bind(staff_id)
    .bind(assigned_by)
    .bind(assigned_at)
    .execute(pool)
    .await;

    if let Err(err) = audit_result {
        tracing::warn!(
            error = %err,
            followup_id = %followup_id,
            "audit append failed; assignment itself committed"
        );
    }

    Ok(AuditRecord {
        followup_id: followup_id.to_string(),
        prev_assigned_to,
        assigned_to: staff_id.to_string(),
        assigned_by: assigned_by.to_string(),
        assigned_at,
    })
}

/// Authoritative audit read, newest first.
pub async fn fetch_assignment_history(
    pool: &PgPool,
    followup_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<AuditRecord>> {
    let rows = sqlx::query(
        "SELECT followup_id, prev_assigned_to, assigned_to, assigned_by, assigned_at \
         FROM radassist.assignments_audit \
         WHERE followup_id = $1 ORDER BY assigned_at DESC LIMIT $2",
    )
    .bind(followup_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to fetch assignment history")?;

    Ok(rows
        .iter()
        .map(|row| AuditRecord {
            followup_id: row.get("followup_id"),
            prev_assigned_to: row.get("prev_assigned_to"),
            assigned_to: row.get("assigned_to"),
            assigned_by: row.get("assigned_by"),
            assigned_at: row.get("assigned_at"),
        })
        .collect())
}

async fn append_radiologist_audit(
    pool: &PgPool,
    report_id: &str,
    old_radiologist: Option<String>,
    new_radiologist: Option<&str>,
    changed_by: &str,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO radassist.radiologist_assignment_audit
        (id, report_id, old_radiologist_id, new_radiologist_id, changed_by)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(report_id)
    .bind(old_radiologist)
    .bind(new_radiologist)
    .bind(changed_by)
    .execute(pool)
    .await;

    if let Err(err) = result {
        tracing::warn!(error = %err, report_id = %report_id, "radiologist audit append failed");
    }
}

pub async fn assign_radiologist(
    pool: &PgPool,
    report_id: &str,
    radiologist_id: Option<&str>,
    changed_by: &str,
) -> anyhow::Result<()> {
    let row = sqlx::query("SELECT radiologist_id FROM radassist.reports WHERE report_id = $1")
        .bind(report_id)
        .fetch_optional(pool)
        .await
        .context("failed to look up report")?
        .with_context(|| format!("no report with id {report_id}"))?;
    let old_radiologist: Option<String> = row.get("radiologist_id");

    sqlx::query("UPDATE radassist.reports SET radiologist_id = $2 WHERE report_id = $1")
        .bind(report_id)
        .bind(radiologist_id)
        .execute(pool)
        .await
        .context("failed to update radiologist assignment")?;

    append_radiologist_audit(pool, report_id, old_radiologist, radiologist_id, changed_by).await;
    Ok(())
}

pub async fn close_report(pool: &PgPool, report_id: &str, changed_by: &str) -> anyhow::Result<()> {
    let result = sqlx::query(
        "UPDATE radassist.reports SET status = 'closed', closed_at = now() WHERE report_id = $1",
    )
    .bind(report_id)
    .execute(pool)
    .await
    .context("failed to close report")?;
    anyhow::ensure!(result.rows_affected() > 0, "no report with id {report_id}");

    append_radiologist_audit(pool, report_id, None, None, changed_by).await;
    Ok(())
}

pub async fn reopen_report(pool: &PgPool, report_id: &str, changed_by: &str) -> anyhow::Result<()> {
    let result = sqlx::query(
        "UPDATE radassist.reports SET status = 'open', closed_at = NULL WHERE report_id = $1",
    )
    .bind(report_id)
    .execute(pool)
    .await
    .context("failed to reopen report")?;
    anyhow::ensure!(result.rows_affected() > 0, "no report with id {report_id}");

    append_radiologist_audit(pool, report_id, None, None, changed_by).await;
    Ok(())
}

/// KPI counts from the precomputed views; never recomputed client-side when
/// the primary source is reachable.
pub async fn dashboard_counts(pool: &PgPool) -> anyhow::Result<DashboardCounts> {
    let counts_row = sqlx::query("SELECT total_scans, pending, completed, overdue FROM radassist.v_dashboard_counts")
        .fetch_one(pool)
        .await
        .context("failed to fetch dashboard counts")?;
    let assignments_row =
        sqlx::query("SELECT assignments FROM radassist.v_assignments_total_this_week")
            .fetch_one(pool)
            .await
            .context("failed to fetch weekly assignment total")?;

    Ok(DashboardCounts {
        total_scans: counts_row.get("total_scans"),
        pending: counts_row.get("pending"),
        completed: counts_row.get("completed"),
        overdue: counts_row.get("overdue"),
        assignments_this_week: assignments_row.get("assignments"),
    })
}

/// SLA percentage, absent when the view has nothing to measure. A failed
/// read degrades to `None` rather than failing the dashboard.
pub async fn sla_summary(pool: &PgPool) -> Option<SlaSummary> {
    let result = sqlx::query("SELECT pct_met FROM radassist.v_followups_sla")
        .fetch_one(pool)
        .await;
    match result {
        Ok(row) => {
            let pct_met: Option<f64> = row.get("pct_met");
            pct_met.map(|pct_met| SlaSummary { pct_met })
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to fetch SLA summary");
            None
        }
    }
}

pub async fn staff_week_loads(pool: &PgPool) -> anyhow::Result<Vec<StaffWeekLoad>> {
    let rows = sqlx::query(
        "SELECT staff, staff_id, total_assignments \
         FROM radassist.v_assignments_by_staff_week ORDER BY total_assignments DESC",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch staff assignment loads")?;

    Ok(rows
        .iter()
        .map(|row| StaffWeekLoad {
            staff_id: row.get("staff_id"),
            staff_name: row.get("staff"),
            total_assignments: row.get("total_assignments"),
        })
        .collect())
}

pub async fn recent_assignments(pool: &PgPool) -> anyhow::Result<Vec<RecentAssignment>> {
    let rows = sqlx::query(
        "SELECT patient_ref, action_required, assigned_to, assigned_by, assigned_at, status \
         FROM radassist.v_assignments_recent",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch recent assignments")?;

    Ok(rows
        .iter()
        .map(|row| {
            let status: String = row.get("status");
            RecentAssignment {
                patient_ref: row.get("patient_ref"),
                action_required: row.get("action_required"),
                assigned_to: row.get("assigned_to"),
                assigned_by: row.get("assigned_by"),
                assigned_at: row.get("assigned_at"),
                status: Status::parse(&status),
            }
        })
        .collect())
}

/// Event dates and status counts inside [start, end), for the weekly report.
pub async fn fetch_weekly_activity(
    pool: &PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<WeeklyActivity> {
    let report_rows = sqlx::query(
        "SELECT reported_at FROM radassist.reports \
         WHERE reported_at >= $1 AND reported_at < $2",
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .context("failed to fetch weekly reports")?;

    let followup_rows = sqlx::query(
        "SELECT created_at, status FROM radassist.followups \
         WHERE created_at >= $1 AND created_at < $2",
    )
    .bind(start.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()))
    .bind(end.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()))
    .fetch_all(pool)
    .await
    .context("failed to fetch weekly follow-ups")?;

    let mut activity = WeeklyActivity::default();
    for row in &report_rows {
        if let Some(date) = row.get::<Option<NaiveDate>, _>("reported_at") {
            activity.report_dates.push(date);
        }
    }
    for row in &followup_rows {
        let created_at: DateTime<Utc> = row.get("created_at");
        activity.followup_dates.push(created_at.date_naive());
        let status: Option<String> = row.get("status");
        match Status::parse(status.as_deref().unwrap_or("")) {
            Status::Completed => activity.completed += 1,
            Status::Pending => activity.pending += 1,
            Status::Overdue => activity.overdue += 1,
            Status::Unknown => {}
        }
    }
    Ok(activity)
}

/// Call the server-side suggestion RPC. Any failure (including the function
/// not existing on this instance) degrades to `None`, letting the local
/// heuristic take over.
pub async fn fetch_ai_suggestion(
    pool: &PgPool,
    action: &str,
    due_date: Option<NaiveDate>,
    status: Status,
) -> Option<String> {
    let result = sqlx::query("SELECT radassist.get_ai_suggestion($1, $2, $3) AS suggestion")
        .bind(action)
        .bind(due_date)
        .bind(status.as_str())
        .fetch_one(pool)
        .await;

    match result {
        Ok(row) => row.try_get::<Option<String>, _>("suggestion").ok().flatten(),
        Err(err) => {
            tracing::debug!(error = %err, "server suggestion unavailable, using heuristic");
            None
        }
    }
}

/// Exact row counts per table for the data preview.
pub async fn preview_counts(pool: &PgPool) -> anyhow::Result<PreviewCounts> {
    async fn count(pool: &PgPool, query: &str) -> anyhow::Result<i64> {
        let row = sqlx::query(query).fetch_one(pool).await?;
        Ok(row.get("n"))
    }

    let (followups, reports, staff) = tokio::try_join!(
        count(pool, "SELECT count(*) AS n FROM radassist.followups"),
        count(pool, "SELECT count(*) AS n FROM radassist.reports"),
        count(pool, "SELECT count(*) AS n FROM radassist.staff"),
    )
    .context("failed to fetch preview counts")?;

    Ok(PreviewCounts {
        followups,
        reports,
        staff,
    })
}

/// EHR summary rows, ordered by surname the way the patients page lists
/// them. Demographics plus precomputed record counts from the view.
pub async fn fetch_patient_summaries(pool: &PgPool) -> anyhow::Result<Vec<PatientSummary>> {
    let rows = sqlx::query(
        "SELECT patient_id, nhs_number, first_name, last_name, dob, sex, gp_practice, \
         allergies_count, medications_count, conditions_count \
         FROM radassist.v_patient_ehr_summary ORDER BY last_name",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch patient summaries")?;

    Ok(rows
        .iter()
        .map(|row| PatientSummary {
            patient_id: row.get("patient_id"),
            nhs_number: row.get("nhs_number"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            dob: row.get("dob"),
            sex: row.get("sex"),
            gp_practice: row.get("gp_practice"),
            allergies_count: row.get("allergies_count"),
            medications_count: row.get("medications_count"),
            conditions_count: row.get("conditions_count"),
        })
        .collect())
}

pub async fn fetch_allergies(pool: &PgPool, patient_id: &str) -> anyhow::Result<Vec<Allergy>> {
    let rows = sqlx::query(
        "SELECT patient_id, allergy_name, severity \
         FROM radassist.allergies WHERE patient_id = $1",
    )
    .bind(patient_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch allergies")?;

    Ok(rows
        .iter()
        .map(|row| Allergy {
            patient_id: row.get("patient_id"),
            allergy_name: row.get("allergy_name"),
            severity: row.get("severity"),
        })
        .collect())
}

pub async fn fetch_medications(pool: &PgPool, patient_id: &str) -> anyhow::Result<Vec<Medication>> {
    let rows = sqlx::query(
        "SELECT patient_id, drug_name, dose, frequency, active \
         FROM radassist.medications WHERE patient_id = $1",
    )
    .bind(patient_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch medications")?;

    Ok(rows
        .iter()
        .map(|row| Medication {
            patient_id: row.get("patient_id"),
            drug_name: row.get("drug_name"),
            dose: row.get("dose"),
            frequency: row.get("frequency"),
            active: row.get("active"),
        })
        .collect())
}

pub async fn fetch_conditions(pool: &PgPool, patient_id: &str) -> anyhow::Result<Vec<Condition>> {
    let rows = sqlx::query(
        "SELECT patient_id, condition_name, status \
         FROM radassist.conditions WHERE patient_id = $1",
    )
    .bind(patient_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch conditions")?;

    Ok(rows
        .iter()
        .map(|row| Condition {
            patient_id: row.get("patient_id"),
            condition_name: row.get("condition_name"),
            status: row.get("status"),
        })
        .collect())
}

/// Five most recent reports for a patient, newest first.
pub async fn fetch_recent_reports(pool: &PgPool, patient_ref: &str) -> anyhow::Result<Vec<Report>> {
    let rows = sqlx::query(
        "SELECT report_id, patient_ref, scan_type, radiologist_id, reported_at, summary, \
         follow_up_instruction, status \
         FROM radassist.reports WHERE patient_ref = $1 \
         ORDER BY reported_at DESC NULLS LAST LIMIT $2",
    )
    .bind(patient_ref)
    .bind(RECENT_LIMIT)
    .fetch_all(pool)
    .await
    .context("failed to fetch recent reports")?;

    Ok(rows
        .iter()
        .map(|row| {
            let status: String = row.get("status");
            Report {
                report_id: row.get("report_id"),
                patient_ref: row.get("patient_ref"),
                scan_type: row.get("scan_type"),
                radiologist_id: row.get("radiologist_id"),
                reported_at: row.get("reported_at"),
                summary: row.get("summary"),
                follow_up_instruction: row.get("follow_up_instruction"),
                status: ReportStatus::parse(&status),
            }
        })
        .collect())
}

/// Five most recent follow-ups for a patient by due date.
pub async fn fetch_recent_followups(
    pool: &PgPool,
    patient_ref: &str,
) -> anyhow::Result<Vec<FollowUp>> {
    let rows = sqlx::query(
        "SELECT followup_id, patient_ref, scan_date, action_required, report_id, \
         assigned_to, status, priority, due_date \
         FROM radassist.followups WHERE patient_ref = $1 \
         ORDER BY due_date DESC NULLS LAST LIMIT $2",
    )
    .bind(patient_ref)
    .bind(RECENT_LIMIT)
    .fetch_all(pool)
    .await
    .context("failed to fetch recent follow-ups")?;

    Ok(rows.iter().map(followup_from_row).collect())
}

pub async fn insert_patient(
    pool: &PgPool,
    patient_id: &str,
    nhs_number: &str,
    first_name: &str,
    last_name: &str,
    dob: Option<NaiveDate>,
    sex: &str,
    gp_practice: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO radassist.patients
        (patient_id, nhs_number, first_name, last_name, dob, sex, gp_practice)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(patient_id)
    .bind(nhs_number)
    .bind(first_name)
    .bind(last_name)
    .bind(dob)
    .bind(sex)
    .bind(gp_practice)
    .execute(pool)
    .await
    .context("failed to insert patient")?;
    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        followup_id: String,
        patient_ref: String,
        scan_date: Option<NaiveDate>,
        action_required: String,
        report_id: Option<String>,
        assigned_to: Option<String>,
        status: Option<String>,
        priority: Option<String>,
        due_date: Option<NaiveDate>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let outcome = sqlx::query(
            r#"
            INSERT INTO radassist.followups
            (followup_id, patient_ref, scan_date, action_required, report_id, assigned_to,
             status, priority, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (followup_id) DO NOTHING
            "#,
        )
        .bind(&row.followup_id)
        .bind(&row.patient_ref)
        .bind(row.scan_date)
        .bind(&row.action_required)
        .bind(&row.report_id)
        .bind(&row.assigned_to)
        .bind(&row.status)
        .bind(&row.priority)
        .bind(row.due_date)
        .execute(pool)
        .await?;

        if outcome.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn insert_ticket(
    pool: &PgPool,
    ticket_id: &str,
    name: &str,
    email: &str,
    description: &str,
    priority: Priority,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO radassist.tickets (ticket_id, name, email, description, priority, status)
        VALUES ($1, $2, $3, $4, $5, 'Open')
        "#,
    )
    .bind(ticket_id)
    .bind(name)
    .bind(email)
    .bind(description)
    .bind(priority.as_str())
    .execute(pool)
    .await
    .context("failed to insert ticket")?;
    Ok(())
}
