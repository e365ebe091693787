use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Dataset, FollowUp, Priority, Report, ReportStatus, StaffMember, Status};

pub const DEFAULT_BASE_URL: &str =
    "https://raw.githubusercontent.com/feditheanalyst/AI-2025-001-Clean-Synthetic-Dataset-for-Backlog-Demo/main";

const CACHE_FILE: &str = "fallback_dataset.json";
const CACHE_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub base_url: String,
    pub cache_dir: PathBuf,
}

impl FallbackConfig {
    pub fn from_env() -> FallbackConfig {
        let base_url = std::env::var("RADASSIST_FALLBACK_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let cache_dir = std::env::var("RADASSIST_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("radassist-worklist"));
        FallbackConfig { base_url, cache_dir }
    }

    fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE)
    }
}

// Wire shapes for the flat JSON documents. The fallback dataset and the
// primary schema spell several fields differently; every spelling is
// captured here and resolved once in the normalize functions, so nothing
// downstream ever sees a fallback chain.

#[derive(Debug, Default, Deserialize)]
pub struct RawFollowUp {
    pub id: Option<String>,
    pub followup_id: Option<String>,
    pub patient_id: Option<String>,
    pub patient_ref: Option<String>,
    pub scan_date: Option<String>,
    pub follow_up_action: Option<String>,
    pub action_required: Option<String>,
    pub report_id: Option<String>,
    pub assigned_staff: Option<String>,
    pub assigned_to: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawReport {
    pub id: Option<String>,
    pub report_id: Option<String>,
    pub patient_id: Option<String>,
    pub patient_ref: Option<String>,
    pub scan_type: Option<String>,
    pub radiologist: Option<String>,
    pub date: Option<String>,
    pub reported_at: Option<String>,
    pub notes: Option<String>,
    pub summary: Option<String>,
    pub findings: Option<String>,
    pub follow_up_instruction: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawStaff {
    pub id: Option<String>,
    pub staff_id: Option<String>,
    pub name: Option<String>,
    pub staff_name: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub team: Option<String>,
    pub is_active: Option<bool>,
}

/// Dates arrive either as plain `YYYY-MM-DD` or as a full RFC 3339
/// timestamp. Anything else maps to `None` rather than failing the record.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.date_naive())
        .ok()
}

fn first_nonempty(candidates: [Option<&String>; 2]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .cloned()
}

pub fn normalize_followup(raw: &RawFollowUp) -> FollowUp {
    FollowUp {
        followup_id: first_nonempty([raw.followup_id.as_ref(), raw.id.as_ref()])
            .unwrap_or_default(),
        patient_ref: first_nonempty([raw.patient_ref.as_ref(), raw.patient_id.as_ref()])
            .unwrap_or_default(),
        scan_date: raw.scan_date.as_deref().and_then(parse_date),
        action_required: first_nonempty([
            raw.action_required.as_ref(),
            raw.follow_up_action.as_ref(),
        ])
        .unwrap_or_default(),
        report_id: raw.report_id.clone().filter(|s| !s.trim().is_empty()),
        assigned_to: first_nonempty([raw.assigned_to.as_ref(), raw.assigned_staff.as_ref()]),
        status: Status::parse(raw.status.as_deref().unwrap_or("")),
        priority: Priority::parse(raw.priority.as_deref().unwrap_or("")),
        due_date: raw.due_date.as_deref().and_then(parse_date),
    }
}

pub fn normalize_report(raw: &RawReport) -> Report {
    Report {
        report_id: first_nonempty([raw.report_id.as_ref(), raw.id.as_ref()]).unwrap_or_default(),
        patient_ref: first_nonempty([raw.patient_ref.as_ref(), raw.patient_id.as_ref()])
            .unwrap_or_default(),
        scan_type: raw.scan_type.clone().unwrap_or_default(),
        radiologist_id: raw.radiologist.clone().filter(|s| !s.trim().is_empty()),
        reported_at: first_nonempty([raw.reported_at.as_ref(), raw.date.as_ref()])
            .as_deref()
            .and_then(parse_date),
        summary: first_nonempty([raw.summary.as_ref(), raw.notes.as_ref()])
            .or_else(|| raw.findings.clone())
            .unwrap_or_default(),
        follow_up_instruction: raw
            .follow_up_instruction
            .clone()
            .filter(|s| !s.trim().is_empty()),
        status: ReportStatus::parse(raw.status.as_deref().unwrap_or("open")),
    }
}

pub fn normalize_staff(raw: &RawStaff) -> StaffMember {
    StaffMember {
        staff_id: first_nonempty([raw.staff_id.as_ref(), raw.id.as_ref()]).unwrap_or_default(),
        staff_name: first_nonempty([raw.staff_name.as_ref(), raw.name.as_ref()])
            .unwrap_or_default(),
        role: raw.role.clone().unwrap_or_default(),
        team: first_nonempty([raw.team.as_ref(), raw.department.as_ref()]).unwrap_or_default(),
        is_active: raw.is_active.unwrap_or(true),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedDataset {
    fetched_at: DateTime<Utc>,
    dataset: Dataset,
}

pub fn is_fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - fetched_at).num_hours() < CACHE_MAX_AGE_HOURS
}

fn read_cache(path: &Path) -> Option<CachedDataset> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn write_cache(path: &Path, cached: &CachedDataset) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create cache dir {}", dir.display()))?;
    }
    let payload = serde_json::to_string(cached)?;
    std::fs::write(path, payload)
        .with_context(|| format!("failed to write cache file {}", path.display()))?;
    Ok(())
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> anyhow::Result<Vec<T>> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()
        .with_context(|| format!("non-success response from {url}"))?;
    let records = response
        .json::<Vec<T>>()
        .await
        .with_context(|| format!("invalid JSON from {url}"))?;
    Ok(records)
}

async fn fetch_remote(client: &reqwest::Client, base_url: &str) -> anyhow::Result<Dataset> {
    let base = base_url.trim_end_matches('/');
    let followups_url = format!("{base}/followups.json");
    let reports_url = format!("{base}/reports.json");
    let staff_url = format!("{base}/staff.json");
    let (followups, reports, staff) = tokio::try_join!(
        fetch_json::<RawFollowUp>(client, &followups_url),
        fetch_json::<RawReport>(client, &reports_url),
        fetch_json::<RawStaff>(client, &staff_url),
    )?;

    Ok(Dataset {
        followups: followups.iter().map(normalize_followup).collect(),
        reports: reports.iter().map(normalize_report).collect(),
        staff: staff.iter().map(normalize_staff).collect(),
    })
}

/// Load the fallback dataset. Cache hits within the freshness window skip
/// the network entirely; on fetch failure an expired cache is served stale;
/// with no cache at all the result is an empty dataset, never an error.
pub async fn load(client: &reqwest::Client, config: &FallbackConfig) -> Dataset {
    let cache_path = config.cache_path();
    let now = Utc::now();
    let cached = read_cache(&cache_path);

    if let Some(cached) = &cached {
        if is_fresh(cached.fetched_at, now) {
            tracing::info!("using cached fallback dataset");
            return cached.dataset.clone();
        }
    }

    match fetch_remote(client, &config.base_url).await {
        Ok(dataset) => {
            let entry = CachedDataset {
                fetched_at: now,
                dataset: dataset.clone(),
            };
            if let Err(err) = write_cache(&cache_path, &entry) {
                tracing::warn!(error = %err, "failed to cache fallback dataset");
            }
            dataset
        }
        Err(err) => match cached {
            Some(cached) => {
                tracing::warn!(error = %err, "fallback fetch failed, serving stale cache");
                cached.dataset
            }
            None => {
                tracing::warn!(error = %err, "fallback fetch failed with no cache available");
                Dataset::default()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn parses_both_date_shapes() {
        assert_eq!(
            parse_date("2026-03-01"),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert_eq!(
            parse_date("2026-03-01T09:30:00+00:00"),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn followup_normalization_prefers_primary_spellings() {
        let raw = RawFollowUp {
            id: Some("legacy-1".to_string()),
            followup_id: Some("FU-1".to_string()),
            patient_id: Some("P-OLD".to_string()),
            patient_ref: Some("NHS001001".to_string()),
            follow_up_action: Some("old action".to_string()),
            action_required: Some("Repeat chest CT".to_string()),
            assigned_staff: Some("Dr Legacy".to_string()),
            assigned_to: Some("S1".to_string()),
            status: Some("Pending".to_string()),
            priority: Some("High".to_string()),
            due_date: Some("2026-09-01".to_string()),
            ..Default::default()
        };
        let followup = normalize_followup(&raw);
        assert_eq!(followup.followup_id, "FU-1");
        assert_eq!(followup.patient_ref, "NHS001001");
        assert_eq!(followup.action_required, "Repeat chest CT");
        assert_eq!(followup.assigned_to.as_deref(), Some("S1"));
        assert_eq!(followup.status, Status::Pending);
        assert_eq!(followup.priority, Priority::High);
    }

    #[test]
    fn followup_normalization_accepts_fallback_spellings() {
        let raw = RawFollowUp {
            id: Some("FU-9".to_string()),
            patient_id: Some("P-123".to_string()),
            follow_up_action: Some("Book MRI".to_string()),
            assigned_staff: Some("S2".to_string()),
            status: Some("overbyed".to_string()),
            ..Default::default()
        };
        let followup = normalize_followup(&raw);
        assert_eq!(followup.followup_id, "FU-9");
        assert_eq!(followup.patient_ref, "P-123");
        assert_eq!(followup.action_required, "Book MRI");
        assert_eq!(followup.assigned_to.as_deref(), Some("S2"));
        assert_eq!(followup.status, Status::Unknown);
    }

    #[test]
    fn staff_normalization_maps_department_to_team() {
        let raw = RawStaff {
            id: Some("S1".to_string()),
            name: Some("Sarah Chen".to_string()),
            role: Some("Radiologist".to_string()),
            department: Some("CT".to_string()),
            ..Default::default()
        };
        let staff = normalize_staff(&raw);
        assert_eq!(staff.staff_id, "S1");
        assert_eq!(staff.staff_name, "Sarah Chen");
        assert_eq!(staff.team, "CT");
        assert!(staff.is_active);
    }

    #[test]
    fn freshness_window_is_24_hours() {
        let now = Utc::now();
        assert!(is_fresh(now - Duration::hours(23), now));
        assert!(!is_fresh(now - Duration::hours(24), now));
        assert!(!is_fresh(now - Duration::days(3), now));
    }

    #[test]
    fn cache_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE);
        let entry = CachedDataset {
            fetched_at: Utc::now(),
            dataset: Dataset {
                followups: vec![normalize_followup(&RawFollowUp {
                    followup_id: Some("FU-1".to_string()),
                    patient_ref: Some("NHS001001".to_string()),
                    status: Some("pending".to_string()),
                    ..Default::default()
                })],
                reports: Vec::new(),
                staff: Vec::new(),
            },
        };

        write_cache(&path, &entry).unwrap();
        let read = read_cache(&path).unwrap();
        assert_eq!(read.dataset, entry.dataset);
    }

    fn unroutable_config(dir: &Path) -> FallbackConfig {
        FallbackConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            cache_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn expired_cache_is_served_stale_when_refetch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = unroutable_config(dir.path());

        let stale = Dataset {
            followups: vec![normalize_followup(&RawFollowUp {
                followup_id: Some("FU-1".to_string()),
                patient_ref: Some("NHS001001".to_string()),
                status: Some("pending".to_string()),
                ..Default::default()
            })],
            reports: Vec::new(),
            staff: Vec::new(),
        };
        let entry = CachedDataset {
            fetched_at: Utc::now() - Duration::hours(48),
            dataset: stale.clone(),
        };
        write_cache(&config.cache_path(), &entry).unwrap();

        let client = reqwest::Client::new();
        let dataset = load(&client, &config).await;
        assert_eq!(dataset, stale);
    }

    #[tokio::test]
    async fn failed_fetch_with_no_cache_yields_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let config = unroutable_config(dir.path());

        let client = reqwest::Client::new();
        let dataset = load(&client, &config).await;
        assert!(dataset.is_empty());
    }

    #[test]
    fn missing_or_corrupt_cache_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE);
        assert!(read_cache(&path).is_none());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(read_cache(&path).is_none());
    }
}
