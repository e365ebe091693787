use std::path::PathBuf;

use anyhow::Context;
use chrono::{Datelike, Duration, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

mod assignment;
mod db;
mod ehr;
mod fallback;
mod models;
mod report;
mod source;
mod ticket;
mod triage;
mod worklist;

use assignment::{AssignmentTracker, HistoryOrigin, LOCAL_ACTOR};
use fallback::FallbackConfig;
use models::{Priority, Provenance, Status};

#[derive(Parser)]
#[command(name = "radassist-worklist")]
#[command(about = "Radiology follow-up worklist and assignment tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import follow-ups from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show the joined follow-up worklist
    Worklist {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        status: Option<String>,
        /// Show only follow-ups with no assignee
        #[arg(long, default_value_t = false)]
        unassigned: bool,
    },
    /// Show overdue and high-priority alerts
    Alerts {
        /// Count a follow-up once even when it is both overdue and urgent
        #[arg(long, default_value_t = false)]
        dedup_total: bool,
    },
    /// Assign a follow-up to a staff member
    Assign {
        #[arg(long)]
        followup: String,
        #[arg(long)]
        staff: String,
        #[arg(long, default_value = LOCAL_ACTOR)]
        actor: String,
    },
    /// List staff available for assignment
    Staff {
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Show the assignment history for a follow-up
    History {
        #[arg(long)]
        followup: String,
        #[arg(long, default_value_t = db::HISTORY_LIMIT)]
        limit: i64,
    },
    /// Change the radiologist on a report (omit --staff to unassign)
    AssignRadiologist {
        #[arg(long)]
        report: String,
        #[arg(long)]
        staff: Option<String>,
        #[arg(long, default_value = LOCAL_ACTOR)]
        actor: String,
    },
    /// Close a report
    CloseReport {
        #[arg(long)]
        report: String,
        #[arg(long, default_value = LOCAL_ACTOR)]
        actor: String,
    },
    /// Reopen a closed report
    ReopenReport {
        #[arg(long)]
        report: String,
        #[arg(long, default_value = LOCAL_ACTOR)]
        actor: String,
    },
    /// List patient EHR summaries
    Patients {
        /// Search by NHS number or last name
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Show one patient's EHR detail with recent activity
    Patient {
        #[arg(long)]
        id: String,
    },
    /// Register a new patient
    AddPatient {
        #[arg(long)]
        id: String,
        #[arg(long)]
        nhs_number: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        dob: Option<chrono::NaiveDate>,
        #[arg(long, default_value = "")]
        sex: String,
        #[arg(long, default_value = "")]
        gp_practice: String,
    },
    /// Generate the dashboard report
    Dashboard {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show row counts per data collection
    Preview,
    /// Submit a support ticket
    Ticket {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "Low")]
        priority: String,
    },
}

/// Connect to the primary database; required by mutating commands.
async fn connect() -> anyhow::Result<PgPool> {
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set for this command")?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Best-effort connection for read-only views; a missing or unreachable
/// primary degrades to the fallback source instead of failing.
async fn try_connect() -> Option<PgPool> {
    match connect().await {
        Ok(pool) => Some(pool),
        Err(err) => {
            tracing::warn!(error = %err, "primary database unavailable");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} follow-ups from {}.", csv.display());
        }
        Commands::Worklist {
            search,
            status,
            unassigned,
        } => {
            let pool = try_connect().await;
            let client = reqwest::Client::new();
            let config = FallbackConfig::from_env();
            let (dataset, provenance) = source::load(pool.as_ref(), &client, &config).await;
            let today = Utc::now().date_naive();

            let rows = worklist::build_rows(
                &dataset.followups,
                &dataset.reports,
                &dataset.staff,
                today,
            );
            let status_filter = status.as_deref().map(Status::parse);
            let filtered = worklist::filter_rows(&rows, &search, status_filter, unassigned);

            println!("Data source: {}", provenance.as_str());
            println!("{} of {} follow-ups match.", filtered.len(), rows.len());
            for row in &filtered {
                let suggestion = match (&pool, provenance) {
                    (Some(pool), Provenance::Primary) => {
                        db::fetch_ai_suggestion(pool, &row.action, row.due_date, row.status).await
                    }
                    _ => None,
                }
                .unwrap_or_else(|| triage::suggest(&row.action, row.due_date, row.status, today));

                let due = row
                    .due_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "no due date".to_string());
                println!(
                    "- {} [{}] {} | priority {} | assigned {} | due {} | {}",
                    row.patient_ref,
                    row.status.as_str(),
                    row.action,
                    row.priority.as_str(),
                    row.assigned,
                    due,
                    suggestion
                );
            }
        }
        Commands::Alerts { dedup_total } => {
            let pool = try_connect().await;
            let client = reqwest::Client::new();
            let config = FallbackConfig::from_env();
            let (dataset, provenance) = source::load(pool.as_ref(), &client, &config).await;
            let today = Utc::now().date_naive();

            let overdue = triage::overdue_alerts(&dataset.followups, today);
            let urgent = triage::urgent_alerts(&dataset.followups);
            let total = triage::total_alerts(&dataset.followups, today, dedup_total);

            println!("Data source: {}", provenance.as_str());
            println!("Overdue follow-ups: {}", overdue.len());
            println!("High priority pending: {}", urgent.len());
            if dedup_total {
                println!("Total alerts (distinct follow-ups): {total}");
            } else {
                println!("Total alerts: {total}");
            }

            if !overdue.is_empty() {
                println!("\nOverdue:");
                for alert in &overdue {
                    println!("- [{}] {}: {}", alert.kind.as_str(), alert.patient_ref, alert.message);
                }
            }
            if !urgent.is_empty() {
                println!("\nHigh priority pending:");
                for alert in &urgent {
                    println!("- [{}] {}: {}", alert.kind.as_str(), alert.patient_ref, alert.message);
                }
            }
        }
        Commands::Assign {
            followup,
            staff,
            actor,
        } => {
            let pool = connect().await?;
            let mut tracker = AssignmentTracker::new();
            if let Ok(followups) = db::fetch_followups(&pool).await {
                for record in &followups {
                    tracker.observe(record);
                }
            }

            match db::assign_followup(&pool, &followup, &staff, &actor).await {
                Ok(_) => {
                    // Reflect the write locally before any refresh completes.
                    let local = tracker.record_success(&followup, &staff, &actor, Utc::now());
                    let staff_list = db::fetch_staff(&pool).await.unwrap_or_default();
                    println!(
                        "Assigned {} to {}.",
                        followup,
                        worklist::staff_display_name(&staff_list, &local.assigned_to)
                    );

                    let authoritative =
                        db::fetch_assignment_history(&pool, &followup, db::HISTORY_LIMIT)
                            .await
                            .unwrap_or_default();
                    let merged = tracker.merged_history(&followup, &authoritative);
                    println!("Assignment history:");
                    for entry in &merged {
                        let marker = match entry.origin {
                            HistoryOrigin::Local => " (local, pending sync)",
                            HistoryOrigin::Authoritative => "",
                        };
                        println!(
                            "- {} -> {} by {}{}",
                            entry.record.assigned_at.format("%d/%m/%Y %H:%M"),
                            worklist::staff_display_name(&staff_list, &entry.record.assigned_to),
                            entry.record.assigned_by,
                            marker
                        );
                    }
                }
                Err(err) => {
                    // Mutation errors are user-visible and transient; no retry.
                    println!("Couldn't assign: {err:#}");
                }
            }
        }
        Commands::Staff { search } => {
            let pool = try_connect().await;
            let staff_list = match &pool {
                Some(pool) => db::fetch_active_staff(pool).await.ok(),
                None => None,
            };
            let staff_list = match staff_list {
                Some(list) => {
                    println!("Data source: primary");
                    list
                }
                None => {
                    let client = reqwest::Client::new();
                    let config = FallbackConfig::from_env();
                    let dataset = fallback::load(&client, &config).await;
                    println!("Data source: fallback");
                    dataset.staff.into_iter().filter(|s| s.is_active).collect()
                }
            };
            let matches = worklist::filter_staff(&staff_list, &search);
            if matches.is_empty() {
                println!("No matching staff.");
            }
            for member in &matches {
                println!(
                    "- {} ({}) | {} | {}",
                    member.staff_name, member.staff_id, member.role, member.team
                );
            }
        }
        Commands::History { followup, limit } => {
            let pool = connect().await?;
            let staff_list = db::fetch_staff(&pool).await.unwrap_or_default();
            let history = db::fetch_assignment_history(&pool, &followup, limit).await?;
            if history.is_empty() {
                println!("No history yet.");
            } else {
                for record in &history {
                    println!(
                        "- {} -> {} by {}",
                        record.assigned_at.format("%d/%m/%Y %H:%M"),
                        worklist::staff_display_name(&staff_list, &record.assigned_to),
                        record.assigned_by
                    );
                }
            }
        }
        Commands::AssignRadiologist {
            report,
            staff,
            actor,
        } => {
            let pool = connect().await?;
            match db::assign_radiologist(&pool, &report, staff.as_deref(), &actor).await {
                Ok(()) => match staff {
                    Some(staff) => println!("Report {report} assigned to {staff}."),
                    None => println!("Report {report} unassigned."),
                },
                Err(err) => println!("Couldn't assign radiologist: {err:#}"),
            }
        }
        Commands::CloseReport { report, actor } => {
            let pool = connect().await?;
            match db::close_report(&pool, &report, &actor).await {
                Ok(()) => println!("Report {report} closed."),
                Err(err) => println!("Couldn't close report: {err:#}"),
            }
        }
        Commands::ReopenReport { report, actor } => {
            let pool = connect().await?;
            match db::reopen_report(&pool, &report, &actor).await {
                Ok(()) => println!("Report {report} reopened."),
                Err(err) => println!("Couldn't reopen report: {err:#}"),
            }
        }
        Commands::Patients { search } => {
            let pool = connect().await?;
            let patients = db::fetch_patient_summaries(&pool).await?;
            let matches = ehr::filter_patients(&patients, &search);
            println!("{} of {} patients match.", matches.len(), patients.len());
            let today = Utc::now().date_naive();
            for patient in &matches {
                let age = patient
                    .dob
                    .map(|dob| ehr::age_on(dob, today).to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "- {} {} ({}) | NHS {} | age {} | {} | {} allergies, {} medications, {} conditions",
                    patient.first_name,
                    patient.last_name,
                    patient.patient_id,
                    patient.nhs_number,
                    age,
                    patient.gp_practice,
                    patient.allergies_count,
                    patient.medications_count,
                    patient.conditions_count
                );
            }
        }
        Commands::Patient { id } => {
            let pool = connect().await?;
            let patients = db::fetch_patient_summaries(&pool).await?;
            let Some(patient) = patients.iter().find(|p| p.patient_id == id) else {
                println!("No patient with id {id}.");
                return Ok(());
            };

            println!(
                "{} {} | NHS {} | {} | {}",
                patient.first_name,
                patient.last_name,
                patient.nhs_number,
                patient.sex,
                patient.gp_practice
            );

            let allergies = db::fetch_allergies(&pool, &id).await?;
            println!("\nAllergies:");
            if allergies.is_empty() {
                println!("None recorded.");
            }
            for allergy in &allergies {
                println!("- {} ({})", allergy.allergy_name, allergy.severity);
            }

            let medications = db::fetch_medications(&pool, &id).await?;
            println!("\nMedications:");
            if medications.is_empty() {
                println!("None recorded.");
            }
            for med in &medications {
                let state = if med.active { "active" } else { "stopped" };
                println!("- {} {} {} [{}]", med.drug_name, med.dose, med.frequency, state);
            }

            let conditions = db::fetch_conditions(&pool, &id).await?;
            println!("\nConditions:");
            if conditions.is_empty() {
                println!("None recorded.");
            }
            for condition in &conditions {
                println!("- {} [{}]", condition.condition_name, condition.status);
            }

            let reports = db::fetch_recent_reports(&pool, &id).await?;
            println!("\nRecent reports:");
            if reports.is_empty() {
                println!("None recorded.");
            }
            for report in &reports {
                let when = report
                    .reported_at
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unknown date".to_string());
                println!("- {} {} ({})", report.report_id, report.scan_type, when);
            }

            let followups = db::fetch_recent_followups(&pool, &id).await?;
            println!("\nRecent follow-ups:");
            if followups.is_empty() {
                println!("None recorded.");
            }
            for followup in &followups {
                let due = followup
                    .due_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "no due date".to_string());
                println!(
                    "- {} [{}] {} | due {}",
                    followup.followup_id,
                    followup.status.as_str(),
                    followup.action_required,
                    due
                );
            }
        }
        Commands::AddPatient {
            id,
            nhs_number,
            first_name,
            last_name,
            dob,
            sex,
            gp_practice,
        } => {
            let pool = connect().await?;
            db::insert_patient(
                &pool,
                &id,
                &nhs_number,
                &first_name,
                &last_name,
                dob,
                &sex,
                &gp_practice,
            )
            .await?;
            println!("Patient {id} registered.");
        }
        Commands::Dashboard { out } => {
            let today = Utc::now().date_naive();
            let week_start =
                today - Duration::days(today.weekday().num_days_from_monday() as i64);

            let pool = try_connect().await;
            let primary = match &pool {
                Some(pool) => db::dashboard_counts(pool).await.ok().map(|counts| (pool, counts)),
                None => None,
            };

            let markdown = match primary {
                Some((pool, counts)) => {
                    let sla = db::sla_summary(pool).await;
                    let loads = db::staff_week_loads(pool).await.unwrap_or_default();
                    let recent = db::recent_assignments(pool).await.unwrap_or_default();
                    let weekly = db::fetch_weekly_activity(
                        pool,
                        week_start,
                        week_start + Duration::days(7),
                    )
                    .await
                    .ok();
                    report::build_dashboard_report(
                        &counts,
                        sla,
                        &loads,
                        &recent,
                        weekly.as_ref(),
                        week_start,
                        Provenance::Primary,
                    )
                }
                None => {
                    let client = reqwest::Client::new();
                    let config = FallbackConfig::from_env();
                    let dataset = fallback::load(&client, &config).await;
                    let counts = triage::derive_counts(&dataset);
                    report::build_dashboard_report(
                        &counts,
                        None,
                        &[],
                        &[],
                        None,
                        week_start,
                        Provenance::Fallback,
                    )
                }
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, markdown)?;
                    println!("Dashboard written to {}.", path.display());
                }
                None => print!("{markdown}"),
            }
        }
        Commands::Preview => {
            let pool = try_connect().await;
            let counts = match &pool {
                Some(pool) => db::preview_counts(pool).await.ok(),
                None => None,
            };
            match counts {
                Some(counts) => {
                    println!("Data source: primary");
                    println!("Follow-ups: {}", counts.followups);
                    println!("Reports: {}", counts.reports);
                    println!("Staff: {}", counts.staff);
                }
                None => {
                    let client = reqwest::Client::new();
                    let config = FallbackConfig::from_env();
                    let dataset = fallback::load(&client, &config).await;
                    println!("Data source: fallback");
                    println!("Follow-ups: {}", dataset.followups.len());
                    println!("Reports: {}", dataset.reports.len());
                    println!("Staff: {}", dataset.staff.len());
                }
            }
        }
        Commands::Ticket {
            name,
            email,
            description,
            priority,
        } => {
            let pool = connect().await?;
            let client = reqwest::Client::new();
            let endpoints = ticket::TicketEndpoints::from_env();
            let form = ticket::TicketForm {
                name,
                email,
                description,
                priority: Priority::parse(&priority),
            };
            match ticket::submit(&pool, &client, &endpoints, &form).await {
                Ok(outcome) => {
                    println!("Ticket {} submitted.", outcome.ticket_id);
                    if outcome.email_sent {
                        println!("Confirmation email sent to {}.", form.email);
                    } else {
                        println!("Confirmation email not sent.");
                    }
                    if !outcome.webhook_delivered {
                        tracing::warn!("ticket webhook was not delivered");
                    }
                }
                Err(err) => println!("Couldn't submit ticket: {err:#}"),
            }
        }
    }

    Ok(())
}
