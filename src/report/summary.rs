use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{Incident, Provenance, RcaLink};
use crate::report::{LinkStatus, ProcessingOutcome};
use crate::scoring::QualityAssessment;
use crate::scoring::grading::Grade;
use crate::util::utc_compact_string;

pub const SUMMARY_MANIFEST_VERSION: u32 = 1;
const HIGH_IMPACT_THRESHOLD: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportType {
    Full,
    Since(NaiveDate),
    Recent(usize),
}

impl ExportType {
    pub fn label(self) -> String {
        match self {
            Self::Full => "full".to_string(),
            Self::Since(date) => format!("since_{}", date.format("%Y-%m-%d")),
            Self::Recent(count) => format!("recent_{count}"),
        }
    }
}

pub fn report_run_id(started_at: DateTime<Utc>) -> String {
    format!("report-{}", utc_compact_string(started_at))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateRange {
    pub created_after: String,
    pub earliest_created: Option<String>,
    pub latest_created: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvenanceCounts {
    pub comment_link: usize,
    pub naming_convention_search: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub policy_checksum: String,
    pub backend: String,
    pub export_type: String,
    pub date_range: DateRange,
    pub incident_count: usize,
    pub row_count: usize,
    pub linked: ProvenanceCounts,
    pub unresolved_links: usize,
    pub link_errors: usize,
    pub timed_out: usize,
    pub assessed: usize,
    pub failed_assessments: usize,
    pub low_confidence_assessments: usize,
    pub cache_hits: usize,
    pub grade_distribution: BTreeMap<String, usize>,
    pub average_score: Option<f64>,
    pub rca_match_rate: f64,
    pub average_business_impact: Option<f64>,
    pub high_impact_incidents: usize,
    pub total_downtime_minutes: u64,
    pub average_detection_minutes: Option<f64>,
    pub average_resolution_minutes: Option<f64>,
    pub average_automation_score: Option<f64>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SummaryContext {
    pub run_id: String,
    pub policy_checksum: String,
    pub backend: String,
    pub export_type: ExportType,
    pub created_after: NaiveDate,
    pub warnings: Vec<String>,
}

pub fn build_summary(
    context: SummaryContext,
    incidents: &[Incident],
    row_count: usize,
    links: &HashMap<String, RcaLink>,
    assessments: &HashMap<String, QualityAssessment>,
    outcomes: &HashMap<String, ProcessingOutcome>,
) -> ReportSummary {
    let mut linked = ProvenanceCounts::default();
    let mut unresolved_links = 0;
    for incident in incidents {
        match links.get(&incident.key).map(|link| link.provenance) {
            Some(Provenance::CommentLink) => linked.comment_link += 1,
            Some(Provenance::NamingConventionSearch) => linked.naming_convention_search += 1,
            Some(Provenance::Unresolved) | None => unresolved_links += 1,
        }
    }

    let status_count = |status: LinkStatus| {
        outcomes
            .values()
            .filter(|outcome| outcome.link_status == status)
            .count()
    };

    let scored = assessments
        .values()
        .filter(|assessment| assessment.is_scored())
        .collect::<Vec<&QualityAssessment>>();
    let mut grade_distribution = Grade::ALL
        .iter()
        .map(|grade| (grade.as_str().to_string(), 0usize))
        .collect::<BTreeMap<String, usize>>();
    for grade in scored.iter().filter_map(|assessment| assessment.grade) {
        *grade_distribution.entry(grade.as_str().to_string()).or_default() += 1;
    }

    let insights = outcomes
        .values()
        .filter_map(|outcome| outcome.insights.as_ref())
        .collect::<Vec<_>>();

    let matched = linked.comment_link + linked.naming_convention_search;
    let rca_match_rate = if incidents.is_empty() {
        0.0
    } else {
        matched as f64 / incidents.len() as f64
    };

    ReportSummary {
        manifest_version: SUMMARY_MANIFEST_VERSION,
        run_id: context.run_id,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        policy_checksum: context.policy_checksum,
        backend: context.backend,
        export_type: context.export_type.label(),
        date_range: DateRange {
            created_after: context.created_after.format("%Y-%m-%d").to_string(),
            earliest_created: incidents
                .iter()
                .map(|incident| incident.created)
                .min()
                .map(|created| created.to_rfc3339_opts(SecondsFormat::Secs, true)),
            latest_created: incidents
                .iter()
                .map(|incident| incident.created)
                .max()
                .map(|created| created.to_rfc3339_opts(SecondsFormat::Secs, true)),
        },
        incident_count: incidents.len(),
        row_count,
        linked,
        unresolved_links,
        link_errors: status_count(LinkStatus::Error),
        timed_out: status_count(LinkStatus::TimedOut),
        assessed: scored.len(),
        failed_assessments: assessments
            .values()
            .filter(|assessment| !assessment.is_scored())
            .count(),
        low_confidence_assessments: scored
            .iter()
            .filter(|assessment| assessment.low_confidence)
            .count(),
        cache_hits: outcomes.values().filter(|outcome| outcome.cache_hit).count(),
        grade_distribution,
        average_score: average(scored.iter().filter_map(|assessment| assessment.aggregate)),
        rca_match_rate,
        average_business_impact: average(
            insights.iter().map(|insights| insights.business.impact_score),
        ),
        high_impact_incidents: insights
            .iter()
            .filter(|insights| insights.business.impact_score >= HIGH_IMPACT_THRESHOLD)
            .count(),
        total_downtime_minutes: insights
            .iter()
            .map(|insights| u64::from(insights.business.service_downtime_minutes))
            .sum(),
        average_detection_minutes: average(
            insights
                .iter()
                .map(|insights| insights.technical.detection_time_minutes)
                .filter(|minutes| *minutes > 0),
        ),
        average_resolution_minutes: average(
            insights
                .iter()
                .map(|insights| insights.technical.resolution_time_minutes)
                .filter(|minutes| *minutes > 0),
        ),
        average_automation_score: average(
            insights
                .iter()
                .map(|insights| insights.technical.automation_score)
                .filter(|score| *score > 0),
        ),
        warnings: context.warnings,
    }
}

fn average(values: impl Iterator<Item = u32>) -> Option<f64> {
    let (sum, count) = values.fold((0u64, 0u64), |(sum, count), value| {
        (sum + u64::from(value), count + 1)
    });
    if count == 0 {
        None
    } else {
        Some(((sum as f64 / count as f64) * 10.0).round() / 10.0)
    }
}

impl ReportSummary {
    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            incidents = self.incident_count,
            rows = self.row_count,
            comment_links = self.linked.comment_link,
            title_matches = self.linked.naming_convention_search,
            unresolved = self.unresolved_links,
            link_errors = self.link_errors,
            timed_out = self.timed_out,
            "link summary"
        );
        info!(
            assessed = self.assessed,
            failed = self.failed_assessments,
            low_confidence = self.low_confidence_assessments,
            cache_hits = self.cache_hits,
            average_score = ?self.average_score,
            grades = ?self.grade_distribution,
            "quality summary"
        );
        info!(
            match_rate = %format!("{:.1}%", self.rca_match_rate * 100.0),
            average_business_impact = ?self.average_business_impact,
            high_impact = self.high_impact_incidents,
            total_downtime_minutes = self.total_downtime_minutes,
            average_detection_minutes = ?self.average_detection_minutes,
            average_resolution_minutes = ?self.average_resolution_minutes,
            "impact summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    use crate::insights;
    use crate::model::{IncidentStatus, Priority, RcaReference};

    fn incident(key: &str, day: u32) -> Incident {
        Incident {
            key: key.to_string(),
            title: "Outage".to_string(),
            priority: Some(Priority::P1),
            description: String::new(),
            teams: Default::default(),
            created: Utc.with_ymd_and_hms(2024, 2, day, 8, 0, 0).unwrap(),
            status: IncidentStatus::Closed,
            comments: Vec::new(),
        }
    }

    fn context() -> SummaryContext {
        SummaryContext {
            run_id: report_run_id(Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()),
            policy_checksum: "abc".to_string(),
            backend: "heuristic".to_string(),
            export_type: ExportType::Recent(3),
            created_after: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            warnings: vec!["one warning".to_string()],
        }
    }

    #[test]
    fn counts_links_outcomes_and_assessments() {
        let incidents = vec![incident("IR-1", 3), incident("IR-2", 1), incident("IR-3", 9)];
        let reference = RcaReference {
            document_id: "7".to_string(),
            url: "https://wiki/pages/7".to_string(),
            title: None,
        };
        let links = HashMap::from([
            (
                "IR-1".to_string(),
                RcaLink::resolved(Provenance::CommentLink, reference.clone()),
            ),
            (
                "IR-2".to_string(),
                RcaLink::resolved(Provenance::NamingConventionSearch, reference),
            ),
            ("IR-3".to_string(), RcaLink::unresolved()),
        ]);

        let failed = QualityAssessment::failed("heuristic", "f".to_string(), "timed out");
        let assessments = HashMap::from([("IR-1".to_string(), failed)]);

        let mut linked_outcome = ProcessingOutcome::new(LinkStatus::Linked);
        linked_outcome.insights = Some(insights::analyze(
            "Down for 45 minutes, 2,000 users affected.",
            &incidents[0],
        ));
        linked_outcome.cache_hit = true;
        let outcomes = HashMap::from([
            ("IR-1".to_string(), linked_outcome),
            ("IR-2".to_string(), ProcessingOutcome::new(LinkStatus::Linked)),
            ("IR-3".to_string(), ProcessingOutcome::new(LinkStatus::TimedOut)),
        ]);

        let summary = build_summary(context(), &incidents, 3, &links, &assessments, &outcomes);

        assert_eq!(summary.run_id, "report-20240501T103000Z");
        assert_eq!(summary.export_type, "recent_3");
        assert_eq!(summary.linked.comment_link, 1);
        assert_eq!(summary.linked.naming_convention_search, 1);
        assert_eq!(summary.unresolved_links, 1);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.failed_assessments, 1);
        assert_eq!(summary.assessed, 0);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.total_downtime_minutes, 45);
        assert_eq!(summary.average_score, None);
        assert_eq!(summary.grade_distribution.get("A"), Some(&0));
        assert!((summary.rca_match_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(
            summary.date_range.earliest_created.as_deref(),
            Some("2024-02-01T08:00:00Z")
        );
        assert_eq!(
            summary.date_range.latest_created.as_deref(),
            Some("2024-02-09T08:00:00Z")
        );
    }

    #[test]
    fn export_type_labels() {
        assert_eq!(ExportType::Full.label(), "full");
        assert_eq!(
            ExportType::Since(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()).label(),
            "since_2024-06-30"
        );
    }

    #[test]
    fn averages_round_to_one_decimal() {
        assert_eq!(average([70, 75, 81].into_iter()), Some(75.3));
        assert_eq!(average(std::iter::empty()), None);
    }
}
