use sqlx::PgPool;

use crate::db;
use crate::fallback::{self, FallbackConfig};
use crate::models::{Dataset, Provenance};

/// Source selection policy: the primary dataset wins only when the fetch
/// succeeded and at least one collection has rows. A reachable-but-empty
/// primary is treated like an outage.
pub fn choose(primary: anyhow::Result<Dataset>, fallback: Dataset) -> (Dataset, Provenance) {
    match primary {
        Ok(dataset) if !dataset.is_empty() => (dataset, Provenance::Primary),
        Ok(_) => {
            tracing::warn!("primary source returned no records, using fallback dataset");
            (fallback, Provenance::Fallback)
        }
        Err(err) => {
            tracing::warn!(error = %err, "primary source unavailable, using fallback dataset");
            (fallback, Provenance::Fallback)
        }
    }
}

/// Load a unified dataset, trying the primary service first and degrading to
/// the cached fallback documents. Never fails; the worst case is an empty
/// dataset tagged with fallback provenance.
pub async fn load(
    pool: Option<&PgPool>,
    client: &reqwest::Client,
    config: &FallbackConfig,
) -> (Dataset, Provenance) {
    let primary = match pool {
        Some(pool) => db::fetch_dataset(pool).await,
        None => Err(anyhow::anyhow!("no primary database configured")),
    };

    match primary {
        Ok(dataset) if !dataset.is_empty() => (dataset, Provenance::Primary),
        other => {
            let fallback_dataset = fallback::load(client, config).await;
            choose(other, fallback_dataset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, StaffMember, Status};

    fn staff_only_dataset(name: &str) -> Dataset {
        Dataset {
            followups: Vec::new(),
            reports: Vec::new(),
            staff: vec![StaffMember {
                staff_id: "S1".to_string(),
                staff_name: name.to_string(),
                role: "Radiologist".to_string(),
                team: "CT".to_string(),
                is_active: true,
            }],
        }
    }

    fn followup_dataset() -> Dataset {
        Dataset {
            followups: vec![crate::models::FollowUp {
                followup_id: "FU-1".to_string(),
                patient_ref: "NHS001001".to_string(),
                scan_date: None,
                action_required: "Repeat chest CT".to_string(),
                report_id: None,
                assigned_to: None,
                status: Status::Pending,
                priority: Priority::Low,
                due_date: None,
            }],
            reports: Vec::new(),
            staff: Vec::new(),
        }
    }

    #[test]
    fn healthy_primary_wins() {
        let (dataset, provenance) = choose(Ok(followup_dataset()), staff_only_dataset("fallback"));
        assert_eq!(provenance, Provenance::Primary);
        assert_eq!(dataset.followups.len(), 1);
    }

    #[test]
    fn empty_primary_activates_fallback() {
        let (dataset, provenance) = choose(Ok(Dataset::default()), staff_only_dataset("fallback"));
        assert_eq!(provenance, Provenance::Fallback);
        assert_eq!(dataset.staff[0].staff_name, "fallback");
    }

    #[test]
    fn failed_primary_activates_fallback() {
        let (_, provenance) = choose(
            Err(anyhow::anyhow!("connection refused")),
            staff_only_dataset("fallback"),
        );
        assert_eq!(provenance, Provenance::Fallback);
    }

    #[test]
    fn single_nonempty_collection_keeps_primary() {
        // Staff rows alone are enough to count as a live primary.
        let (_, provenance) = choose(Ok(staff_only_dataset("live")), Dataset::default());
        assert_eq!(provenance, Provenance::Primary);
    }

    #[test]
    fn both_sources_empty_still_returns_a_dataset() {
        let (dataset, provenance) = choose(Ok(Dataset::default()), Dataset::default());
        assert_eq!(provenance, Provenance::Fallback);
        assert!(dataset.is_empty());
    }
}
