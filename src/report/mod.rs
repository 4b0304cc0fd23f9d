pub mod output;
pub mod summary;

use std::collections::{BTreeSet, HashMap};

use anyhow::{Result, bail};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::insights::Insights;
use crate::model::{Incident, RcaLink};
use crate::scoring::QualityAssessment;
use crate::scoring::rubric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    TicketKey,
    Title,
    Description,
    Priority,
    Created,
    Status,
    Teams,
    RcaLink,
    RcaDocumentId,
    RcaTitle,
    RcaProvenance,
    LinkStatus,
    AssessmentStatus,
    QualityScore,
    Grade,
    LowConfidence,
    Confidence,
    QualityFeedback,
    Strengths,
    CriticalGaps,
    Recommendations,
    TimelineDetection,
    ImpactAssessment,
    RootCauseAnalysis,
    CommunicationClarity,
    ActionItemsPrevention,
    ProcessAdherence,
    LearningKnowledgeSharing,
    BusinessImpactScore,
    CustomerCountAffected,
    RevenueImpactEst,
    ServiceDowntimeMinutes,
    SeverityJustification,
    RootCauseCategory,
    DetectionTimeMinutes,
    ResolutionTimeMinutes,
    TechnicalDebtLevel,
    AutomationScore,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Self::TicketKey => "ticket_key",
            Self::Title => "title",
            Self::Description => "description",
            Self::Priority => "priority",
            Self::Created => "created",
            Self::Status => "status",
            Self::Teams => "teams",
            Self::RcaLink => "rca_link",
            Self::RcaDocumentId => "rca_document_id",
            Self::RcaTitle => "rca_title",
            Self::RcaProvenance => "rca_provenance",
            Self::LinkStatus => "link_status",
            Self::AssessmentStatus => "assessment_status",
            Self::QualityScore => "quality_score",
            Self::Grade => "grade",
            Self::LowConfidence => "low_confidence",
            Self::Confidence => "confidence",
            Self::QualityFeedback => "quality_feedback",
            Self::Strengths => "strengths",
            Self::CriticalGaps => "critical_gaps",
            Self::Recommendations => "recommendations",
            Self::TimelineDetection => rubric::TIMELINE_DETECTION,
            Self::ImpactAssessment => rubric::IMPACT_ASSESSMENT,
            Self::RootCauseAnalysis => rubric::ROOT_CAUSE_ANALYSIS,
            Self::CommunicationClarity => rubric::COMMUNICATION_CLARITY,
            Self::ActionItemsPrevention => rubric::ACTION_ITEMS_PREVENTION,
            Self::ProcessAdherence => rubric::PROCESS_ADHERENCE,
            Self::LearningKnowledgeSharing => rubric::LEARNING_KNOWLEDGE_SHARING,
            Self::BusinessImpactScore => "business_impact_score",
            Self::CustomerCountAffected => "customer_count_affected",
            Self::RevenueImpactEst => "revenue_impact_est",
            Self::ServiceDowntimeMinutes => "service_downtime_minutes",
            Self::SeverityJustification => "severity_justification",
            Self::RootCauseCategory => "root_cause_category",
            Self::DetectionTimeMinutes => "detection_time_minutes",
            Self::ResolutionTimeMinutes => "resolution_time_minutes",
            Self::TechnicalDebtLevel => "technical_debt_level",
            Self::AutomationScore => "automation_score",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            Self::TicketKey => "Ticket Key",
            Self::Title => "Summary",
            Self::Description => "Description",
            Self::Priority => "Priority",
            Self::Created => "Created Date",
            Self::Status => "Status",
            Self::Teams => "Teams Involved",
            Self::RcaLink => "RCA Link",
            Self::RcaDocumentId => "RCA Document ID",
            Self::RcaTitle => "RCA Title",
            Self::RcaProvenance => "RCA Provenance",
            Self::LinkStatus => "Link Status",
            Self::AssessmentStatus => "Assessment Status",
            Self::QualityScore => "RCA Quality Score",
            Self::Grade => "RCA Grade",
            Self::LowConfidence => "Low Confidence",
            Self::Confidence => "Assessment Confidence",
            Self::QualityFeedback => "Quality Feedback",
            Self::Strengths => "Top Strengths",
            Self::CriticalGaps => "Critical Gaps",
            Self::Recommendations => "Recommendations",
            Self::BusinessImpactScore => "Business Impact Score",
            Self::CustomerCountAffected => "Customer Count Affected",
            Self::RevenueImpactEst => "Revenue Impact Est",
            Self::ServiceDowntimeMinutes => "Service Downtime Minutes",
            Self::SeverityJustification => "Severity Justification",
            Self::RootCauseCategory => "Root Cause Category",
            Self::DetectionTimeMinutes => "Detection Time Minutes",
            Self::ResolutionTimeMinutes => "Resolution Time Minutes",
            Self::TechnicalDebtLevel => "Technical Debt Level",
            Self::AutomationScore => "Automation Score",
            dimension => rubric::RubricDimension::by_key(dimension.name())
                .map(|dimension| dimension.label)
                .unwrap_or("Dimension"),
        }
    }

    fn dimension_key(self) -> Option<&'static str> {
        match self {
            Self::TimelineDetection
            | Self::ImpactAssessment
            | Self::RootCauseAnalysis
            | Self::CommunicationClarity
            | Self::ActionItemsPrevention
            | Self::ProcessAdherence
            | Self::LearningKnowledgeSharing => Some(self.name()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportSchema {
    pub columns: Vec<Column>,
}

impl Default for ReportSchema {
    fn default() -> Self {
        Self {
            columns: vec![
                Column::TicketKey,
                Column::Title,
                Column::Priority,
                Column::Created,
                Column::Status,
                Column::Teams,
                Column::RcaLink,
                Column::BusinessImpactScore,
                Column::CustomerCountAffected,
                Column::RevenueImpactEst,
                Column::ServiceDowntimeMinutes,
                Column::SeverityJustification,
                Column::RootCauseCategory,
                Column::DetectionTimeMinutes,
                Column::ResolutionTimeMinutes,
                Column::TechnicalDebtLevel,
                Column::AutomationScore,
                Column::QualityScore,
                Column::Grade,
                Column::QualityFeedback,
                Column::Strengths,
                Column::CriticalGaps,
            ],
        }
    }
}

impl ReportSchema {
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            bail!("report schema must name at least one column");
        }
        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if !seen.insert(*column) {
                bail!("report schema repeats column {}", column.name());
            }
        }
        Ok(())
    }

    pub fn headers(&self) -> Vec<&'static str> {
        self.columns.iter().map(|column| column.header()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    Empty,
}

impl CellValue {
    fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }

    fn list(values: &[String]) -> Self {
        Self::text(values.join("; "))
    }

    pub fn render(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Empty => String::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(value) => Value::String(value.clone()),
            Self::Integer(value) => Value::from(*value),
            Self::Bool(value) => Value::Bool(*value),
            Self::Empty => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Linked,
    Unresolved,
    Error,
    TimedOut,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linked => "linked",
            Self::Unresolved => "unresolved",
            Self::Error => "error",
            Self::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutcome {
    pub link_status: LinkStatus,
    pub insights: Option<Insights>,
    pub content_text: Option<String>,
    pub cache_hit: bool,
    pub error: Option<String>,
}

impl ProcessingOutcome {
    pub fn new(link_status: LinkStatus) -> Self {
        Self {
            link_status,
            insights: None,
            content_text: None,
            cache_hit: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub ticket_key: String,
    pub cells: Vec<CellValue>,
    pub content_text: Option<String>,
}

struct RowContext<'a> {
    incident: &'a Incident,
    link: Option<&'a RcaLink>,
    assessment: Option<&'a QualityAssessment>,
    outcome: Option<&'a ProcessingOutcome>,
}

pub fn assemble(
    schema: &ReportSchema,
    incidents: &[Incident],
    links: &HashMap<String, RcaLink>,
    assessments: &HashMap<String, QualityAssessment>,
    outcomes: &HashMap<String, ProcessingOutcome>,
) -> Vec<ReportRow> {
    incidents
        .iter()
        .map(|incident| {
            let context = RowContext {
                incident,
                link: links.get(&incident.key),
                assessment: assessments.get(&incident.key),
                outcome: outcomes.get(&incident.key),
            };
            ReportRow {
                ticket_key: incident.key.clone(),
                cells: schema
                    .columns
                    .iter()
                    .map(|column| cell(*column, &context))
                    .collect(),
                content_text: context.outcome.and_then(|outcome| outcome.content_text.clone()),
            }
        })
        .collect()
}

fn cell(column: Column, context: &RowContext<'_>) -> CellValue {
    let incident = context.incident;
    let reference = context.link.and_then(|link| link.reference.as_ref());
    let assessment = context.assessment;
    let insights = context.outcome.and_then(|outcome| outcome.insights.as_ref());

    if let Some(key) = column.dimension_key() {
        return assessment
            .and_then(|assessment| assessment.dimension_score(key))
            .map_or(CellValue::Empty, |score| CellValue::Integer(i64::from(score)));
    }

    match column {
        Column::TicketKey => CellValue::text(incident.key.as_str()),
        Column::Title => CellValue::text(incident.title.as_str()),
        Column::Description => CellValue::text(incident.description.as_str()),
        Column::Priority => incident
            .priority
            .map_or(CellValue::Empty, |priority| CellValue::text(priority.as_str())),
        Column::Created => {
            CellValue::text(incident.created.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        Column::Status => CellValue::text(incident.status.name()),
        Column::Teams => CellValue::text(incident.teams_label()),
        Column::RcaLink => {
            reference.map_or(CellValue::Empty, |reference| CellValue::text(reference.url.as_str()))
        }
        Column::RcaDocumentId => reference.map_or(CellValue::Empty, |reference| {
            CellValue::text(reference.document_id.as_str())
        }),
        Column::RcaTitle => reference
            .and_then(|reference| reference.title.as_deref())
            .map_or(CellValue::Empty, CellValue::text),
        Column::RcaProvenance => context
            .link
            .map_or(CellValue::Empty, |link| CellValue::text(link.provenance.as_str())),
        Column::LinkStatus => {
            let status = match (context.outcome, context.link) {
                (Some(outcome), _) => outcome.link_status,
                (None, Some(link)) if link.is_resolved() => LinkStatus::Linked,
                (None, _) => LinkStatus::Unresolved,
            };
            CellValue::text(status.as_str())
        }
        Column::AssessmentStatus => assessment.map_or(CellValue::Empty, |assessment| {
            CellValue::text(assessment.status.as_str())
        }),
        Column::QualityScore => assessment
            .and_then(|assessment| assessment.aggregate)
            .map_or(CellValue::Empty, |score| CellValue::Integer(i64::from(score))),
        Column::Grade => assessment
            .and_then(|assessment| assessment.grade)
            .map_or(CellValue::Empty, |grade| CellValue::text(grade.as_str())),
        Column::LowConfidence => assessment
            .filter(|assessment| assessment.is_scored())
            .map_or(CellValue::Empty, |assessment| {
                CellValue::Bool(assessment.low_confidence)
            }),
        Column::Confidence => assessment
            .filter(|assessment| assessment.is_scored())
            .map_or(CellValue::Empty, |assessment| {
                CellValue::text(assessment.confidence.as_str())
            }),
        Column::QualityFeedback => assessment.map_or(CellValue::Empty, |assessment| {
            CellValue::text(assessment.feedback.as_str())
        }),
        Column::Strengths => assessment.map_or(CellValue::Empty, |assessment| {
            CellValue::list(&assessment.top_strengths)
        }),
        Column::CriticalGaps => assessment.map_or(CellValue::Empty, |assessment| {
            CellValue::list(&assessment.critical_gaps)
        }),
        Column::Recommendations => assessment.map_or(CellValue::Empty, |assessment| {
            CellValue::list(&assessment.recommendations)
        }),
        Column::BusinessImpactScore => insights.map_or(CellValue::Empty, |insights| {
            CellValue::Integer(i64::from(insights.business.impact_score))
        }),
        Column::CustomerCountAffected => insights.map_or(CellValue::Empty, |insights| {
            CellValue::text(insights.business.customer_count_affected.as_str())
        }),
        Column::RevenueImpactEst => insights.map_or(CellValue::Empty, |insights| {
            CellValue::text(insights.business.revenue_impact_est.as_str())
        }),
        Column::ServiceDowntimeMinutes => insights.map_or(CellValue::Empty, |insights| {
            CellValue::Integer(i64::from(insights.business.service_downtime_minutes))
        }),
        Column::SeverityJustification => insights.map_or(CellValue::Empty, |insights| {
            CellValue::text(insights.business.severity_justification.as_str())
        }),
        Column::RootCauseCategory => insights.map_or(CellValue::Empty, |insights| {
            CellValue::text(insights.technical.root_cause_category.label())
        }),
        Column::DetectionTimeMinutes => insights.map_or(CellValue::Empty, |insights| {
            CellValue::Integer(i64::from(insights.technical.detection_time_minutes))
        }),
        Column::ResolutionTimeMinutes => insights.map_or(CellValue::Empty, |insights| {
            CellValue::Integer(i64::from(insights.technical.resolution_time_minutes))
        }),
        Column::TechnicalDebtLevel => insights.map_or(CellValue::Empty, |insights| {
            CellValue::text(insights.technical.technical_debt_level.label())
        }),
        Column::AutomationScore => insights.map_or(CellValue::Empty, |insights| {
            CellValue::Integer(i64::from(insights.technical.automation_score))
        }),
        Column::TimelineDetection
        | Column::ImpactAssessment
        | Column::RootCauseAnalysis
        | Column::CommunicationClarity
        | Column::ActionItemsPrevention
        | Column::ProcessAdherence
        | Column::LearningKnowledgeSharing => CellValue::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};

    use crate::model::{IncidentStatus, Priority, Provenance, RcaReference};
    use crate::scoring::grading::Grade;

    fn incident(key: &str) -> Incident {
        Incident {
            key: key.to_string(),
            title: format!("{key} outage"),
            priority: Some(Priority::P2),
            description: String::new(),
            teams: ["Payments".to_string(), "Platform".to_string()].into(),
            created: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            status: IncidentStatus::Resolved,
            comments: Vec::new(),
        }
    }

    fn scored(aggregate: u32) -> QualityAssessment {
        let mut assessment = QualityAssessment::failed("canned", "abc".to_string(), "unused");
        assessment.status = crate::scoring::AssessmentStatus::Scored;
        assessment.failure_reason = None;
        assessment.aggregate = Some(aggregate);
        assessment.grade = Some(Grade::C);
        assessment.feedback = "Adequate".to_string();
        assessment.top_strengths = vec!["one".to_string(), "two".to_string()];
        for dimension in &mut assessment.dimensions {
            dimension.score = Some(10);
        }
        assessment
    }

    #[test]
    fn every_incident_yields_exactly_one_row() {
        let incidents = vec![incident("IR-1"), incident("IR-2"), incident("IR-3")];
        let mut links = HashMap::new();
        links.insert(
            "IR-2".to_string(),
            RcaLink::resolved(
                Provenance::CommentLink,
                RcaReference {
                    document_id: "42".to_string(),
                    url: "https://wiki/pages/42".to_string(),
                    title: None,
                },
            ),
        );
        let mut assessments = HashMap::new();
        assessments.insert("IR-2".to_string(), scored(72));

        let rows = assemble(
            &ReportSchema::default(),
            &incidents,
            &links,
            &assessments,
            &HashMap::new(),
        );

        assert_eq!(rows.len(), incidents.len());
        assert_eq!(
            rows.iter().map(|row| row.ticket_key.as_str()).collect::<Vec<_>>(),
            vec!["IR-1", "IR-2", "IR-3"]
        );
        let link_index = ReportSchema::default()
            .columns
            .iter()
            .position(|column| *column == Column::RcaLink)
            .expect("rca_link column");
        assert_eq!(rows[0].cells[link_index], CellValue::Empty);
        assert_eq!(
            rows[1].cells[link_index],
            CellValue::Text("https://wiki/pages/42".to_string())
        );
    }

    #[test]
    fn custom_schema_controls_cells_and_order() {
        let schema = ReportSchema {
            columns: vec![
                Column::QualityScore,
                Column::TicketKey,
                Column::Teams,
                Column::Strengths,
                Column::RootCauseAnalysis,
                Column::LinkStatus,
                Column::LowConfidence,
            ],
        };
        let mut assessments = HashMap::new();
        assessments.insert("IR-7".to_string(), scored(70));

        let rows = assemble(
            &schema,
            &[incident("IR-7")],
            &HashMap::new(),
            &assessments,
            &HashMap::new(),
        );
        assert_eq!(
            rows[0].cells,
            vec![
                CellValue::Integer(70),
                CellValue::Text("IR-7".to_string()),
                CellValue::Text("Payments, Platform".to_string()),
                CellValue::Text("one; two".to_string()),
                CellValue::Integer(10),
                CellValue::Text("unresolved".to_string()),
                CellValue::Bool(false),
            ]
        );
    }

    #[test]
    fn outcome_status_wins_over_derived_status() {
        let schema = ReportSchema {
            columns: vec![Column::LinkStatus, Column::RcaProvenance],
        };
        let mut links = HashMap::new();
        links.insert("IR-9".to_string(), RcaLink::unresolved());
        let mut outcomes = HashMap::new();
        outcomes.insert("IR-9".to_string(), ProcessingOutcome::new(LinkStatus::TimedOut));

        let rows = assemble(&schema, &[incident("IR-9")], &links, &HashMap::new(), &outcomes);
        assert_eq!(
            rows[0].cells,
            vec![
                CellValue::Text("timed_out".to_string()),
                CellValue::Text("unresolved".to_string()),
            ]
        );
    }

    #[test]
    fn schema_validation_rejects_empty_and_duplicates() {
        assert!(ReportSchema::default().validate().is_ok());
        assert!(ReportSchema { columns: Vec::new() }.validate().is_err());
        let duplicated = ReportSchema {
            columns: vec![Column::Grade, Column::TicketKey, Column::Grade],
        };
        let err = duplicated.validate().expect_err("duplicate must fail");
        assert!(err.to_string().contains("grade"));
    }

    #[test]
    fn schema_deserializes_from_config_names() {
        let schema: ReportSchema =
            serde_json::from_str(r#"["ticket_key", "root_cause_analysis", "automation_score"]"#)
                .expect("schema json");
        assert_eq!(
            schema.columns,
            vec![
                Column::TicketKey,
                Column::RootCauseAnalysis,
                Column::AutomationScore
            ]
        );
        assert_eq!(schema.headers()[1], "Root Cause Analysis");
        assert!(serde_json::from_str::<ReportSchema>(r#"["ticket_key", "bogus"]"#).is_err());
    }
}
