use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::model::Incident;
use crate::report::summary::ExportType;
use crate::sources::{IncidentQuery, TicketSource};

pub(super) const DEFAULT_SINCE: &str = "2024-01-01";

pub(super) fn default_since() -> NaiveDate {
    NaiveDate::parse_from_str(DEFAULT_SINCE, "%Y-%m-%d").unwrap_or(NaiveDate::MIN)
}

pub(super) fn export_type(since: Option<NaiveDate>, recent: Option<usize>) -> ExportType {
    match (recent, since) {
        (Some(count), _) => ExportType::Recent(count),
        (None, Some(date)) => ExportType::Since(date),
        (None, None) => ExportType::Full,
    }
}

pub(super) fn fetch_incidents(
    tickets: &dyn TicketSource,
    query: &IncidentQuery,
    recent: Option<usize>,
) -> Result<Vec<Incident>> {
    let incidents = tickets.search(query).context("incident search failed")?;
    let incidents = created_on_or_after(incidents, query.created_after);
    Ok(match recent {
        Some(count) => most_recent(incidents, count),
        None => incidents,
    })
}

// The tracker compares in its own timezone.
pub(super) fn created_on_or_after(incidents: Vec<Incident>, since: NaiveDate) -> Vec<Incident> {
    let fetched = incidents.len();
    let kept = incidents
        .into_iter()
        .filter(|incident| incident.created.date_naive() >= since)
        .collect::<Vec<Incident>>();
    if kept.len() != fetched {
        info!(
            fetched,
            kept = kept.len(),
            since = %since,
            "dropped incidents created before the lower bound"
        );
    }
    kept
}

pub(super) fn most_recent(mut incidents: Vec<Incident>, count: usize) -> Vec<Incident> {
    incidents.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.key.cmp(&b.key)));
    incidents.truncate(count);
    incidents
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};

    use crate::error::SourceError;
    use crate::model::{Comment, IncidentStatus};

    struct FakeTracker {
        incidents: Vec<Incident>,
        fail: bool,
    }

    impl TicketSource for FakeTracker {
        fn search(&self, _query: &IncidentQuery) -> Result<Vec<Incident>, SourceError> {
            if self.fail {
                return Err(SourceError::Auth {
                    service: "jira",
                    status: 403,
                });
            }
            Ok(self.incidents.clone())
        }

        fn fetch_comments(&self, _incident_key: &str) -> Result<Vec<Comment>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn query(since: NaiveDate) -> IncidentQuery {
        IncidentQuery {
            project: "IR".to_string(),
            created_after: since,
            excluded_statuses: Vec::new(),
        }
    }

    fn incident(key: &str, day: u32) -> Incident {
        Incident {
            key: key.to_string(),
            title: String::new(),
            priority: None,
            description: String::new(),
            teams: Default::default(),
            created: Utc.with_ymd_and_hms(2024, 1, day, 23, 30, 0).unwrap(),
            status: IncidentStatus::Open,
            comments: Vec::new(),
        }
    }

    #[test]
    fn recent_keeps_newest_first() {
        let incidents = vec![incident("IR-1", 3), incident("IR-2", 9), incident("IR-3", 5)];
        let kept = most_recent(incidents, 2);
        assert_eq!(
            kept.iter().map(|incident| incident.key.as_str()).collect::<Vec<_>>(),
            vec!["IR-2", "IR-3"]
        );
    }

    #[test]
    fn since_filter_uses_utc_dates() {
        let since = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let kept = created_on_or_after(vec![incident("IR-1", 4), incident("IR-2", 5)], since);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].key, "IR-2");
    }

    #[test]
    fn fetch_applies_lower_bound_then_recent_cap() {
        let tracker = FakeTracker {
            incidents: vec![
                incident("IR-1", 2),
                incident("IR-2", 6),
                incident("IR-3", 8),
                incident("IR-4", 7),
            ],
            fail: false,
        };
        let since = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();

        let all = fetch_incidents(&tracker, &query(since), None).expect("fetch");
        assert_eq!(all.len(), 3);

        let recent = fetch_incidents(&tracker, &query(since), Some(2)).expect("fetch");
        assert_eq!(
            recent.iter().map(|incident| incident.key.as_str()).collect::<Vec<_>>(),
            vec!["IR-3", "IR-4"]
        );
    }

    #[test]
    fn failed_search_is_an_error() {
        let tracker = FakeTracker {
            incidents: Vec::new(),
            fail: true,
        };
        let since = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = fetch_incidents(&tracker, &query(since), None).expect_err("search fails");
        assert!(err.to_string().contains("incident search failed"));
    }

    #[test]
    fn export_type_prefers_recent() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(export_type(Some(date), Some(5)), ExportType::Recent(5));
        assert_eq!(export_type(Some(date), None), ExportType::Since(date));
        assert_eq!(export_type(None, None), ExportType::Full);
        assert_eq!(default_since(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }
}
