pub mod backend;
pub mod grading;
pub mod heuristic;
pub mod rubric;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use self::backend::TextAnalysis;
use self::grading::{Grade, GradingPolicy};
use self::rubric::{DIMENSIONS, RUBRIC_VERSION, RubricDimension};
use crate::util::{sha256_hex, truncate_chars};

pub const TOP_STRENGTHS: usize = 3;
pub const CRITICAL_GAPS: usize = 5;
pub const RECOMMENDATIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Scored,
    Failed,
}

impl AssessmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scored => "scored",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    AboveCeiling,
    BelowZero,
    Rounded,
    Missing,
    UnknownDimension,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCorrection {
    pub dimension: String,
    pub kind: CorrectionKind,
    pub reported: Option<f64>,
    pub applied: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionResult {
    pub key: String,
    pub label: String,
    pub ceiling: u32,
    pub score: Option<u32>,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub status: AssessmentStatus,
    pub backend: String,
    pub fingerprint: String,
    pub dimensions: Vec<DimensionResult>,
    pub aggregate: Option<u32>,
    pub grade: Option<Grade>,
    pub low_confidence: bool,
    pub confidence: ConfidenceTier,
    pub corrections: Vec<ScoreCorrection>,
    pub top_strengths: Vec<String>,
    pub critical_gaps: Vec<String>,
    pub recommendations: Vec<String>,
    pub feedback: String,
    pub failure_reason: Option<String>,
}

impl QualityAssessment {
    pub fn failed(backend: &str, fingerprint: String, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            status: AssessmentStatus::Failed,
            backend: backend.to_string(),
            fingerprint,
            dimensions: DIMENSIONS
                .iter()
                .map(|dimension| DimensionResult {
                    key: dimension.key.to_string(),
                    label: dimension.label.to_string(),
                    ceiling: dimension.ceiling,
                    score: None,
                    strengths: Vec::new(),
                    gaps: Vec::new(),
                    feedback: String::new(),
                })
                .collect(),
            aggregate: None,
            grade: None,
            low_confidence: false,
            confidence: ConfidenceTier::Low,
            corrections: Vec::new(),
            top_strengths: Vec::new(),
            critical_gaps: Vec::new(),
            recommendations: Vec::new(),
            feedback: format!("Quality assessment failed: {reason}"),
            failure_reason: Some(reason),
        }
    }

    pub fn is_scored(&self) -> bool {
        self.status == AssessmentStatus::Scored
    }

    pub fn dimension_score(&self, key: &str) -> Option<u32> {
        self.dimensions
            .iter()
            .find(|dimension| dimension.key == key)
            .and_then(|dimension| dimension.score)
    }
}

pub fn content_fingerprint(plain_text: &str) -> String {
    sha256_hex(&[RUBRIC_VERSION, plain_text])
}

#[derive(Debug, Clone, Copy)]
pub struct ScorerLimits {
    pub max_document_chars: usize,
    pub min_content_chars: usize,
}

impl Default for ScorerLimits {
    fn default() -> Self {
        Self {
            max_document_chars: 8000,
            min_content_chars: 50,
        }
    }
}

pub struct QualityScorer<'a> {
    backend: &'a dyn TextAnalysis,
    grading: &'a GradingPolicy,
    limits: ScorerLimits,
    prompt: String,
}

impl<'a> QualityScorer<'a> {
    pub fn new(
        backend: &'a dyn TextAnalysis,
        grading: &'a GradingPolicy,
        limits: ScorerLimits,
    ) -> Self {
        Self {
            backend,
            grading,
            limits,
            prompt: rubric::build_prompt(grading),
        }
    }

    pub fn backend_id(&self) -> &str {
        self.backend.backend_id()
    }

    pub fn assess(&self, plain_text: &str) -> QualityAssessment {
        let fingerprint = content_fingerprint(plain_text);
        let backend_id = self.backend.backend_id();

        let visible_chars = plain_text.trim().chars().count();
        if visible_chars < self.limits.min_content_chars {
            return QualityAssessment::failed(
                backend_id,
                fingerprint,
                format!(
                    "insufficient content: {visible_chars} characters (minimum {})",
                    self.limits.min_content_chars
                ),
            );
        }

        let document = truncate_chars(plain_text, self.limits.max_document_chars);
        let response = match self.backend.analyze(&self.prompt, document) {
            Ok(response) => response,
            Err(err) => return QualityAssessment::failed(backend_id, fingerprint, err.to_string()),
        };

        match validate_response(&response) {
            Ok(validated) => self.build(backend_id, fingerprint, validated),
            Err(reason) => QualityAssessment::failed(
                backend_id,
                fingerprint,
                format!("malformed analysis response: {reason}"),
            ),
        }
    }

    fn build(
        &self,
        backend_id: &str,
        fingerprint: String,
        validated: ValidatedResponse,
    ) -> QualityAssessment {
        let aggregate = validated
            .dimensions
            .iter()
            .filter_map(|dimension| dimension.score)
            .sum::<u32>()
            .min(100);
        let grade = self.grading.grade_for(aggregate);
        let low_confidence = !validated.corrections.is_empty();
        if low_confidence {
            debug!(
                backend = backend_id,
                corrections = validated.corrections.len(),
                "backend output corrected"
            );
        }

        let confidence = if low_confidence {
            ConfidenceTier::Low
        } else {
            confidence_tier(&validated.dimensions, aggregate)
        };
        let feedback = if validated.feedback.trim().is_empty() {
            band_feedback(grade, aggregate)
        } else {
            validated.feedback.trim().to_string()
        };

        QualityAssessment {
            status: AssessmentStatus::Scored,
            backend: backend_id.to_string(),
            fingerprint,
            top_strengths: top_strengths(&validated.dimensions, &validated.strengths),
            critical_gaps: critical_gaps(&validated.dimensions),
            recommendations: recommendations(&validated.dimensions, grade),
            dimensions: validated.dimensions,
            aggregate: Some(aggregate),
            grade: Some(grade),
            low_confidence,
            confidence,
            corrections: validated.corrections,
            feedback,
            failure_reason: None,
        }
    }
}

#[derive(Debug)]
struct ValidatedResponse {
    dimensions: Vec<DimensionResult>,
    corrections: Vec<ScoreCorrection>,
    strengths: Vec<String>,
    feedback: String,
}

fn validate_response(response: &Value) -> Result<ValidatedResponse, String> {
    let object = response
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;
    let reported = object
        .get("dimensions")
        .and_then(Value::as_object)
        .ok_or_else(|| "missing \"dimensions\" object".to_string())?;

    let known = DIMENSIONS
        .iter()
        .filter(|dimension| reported.contains_key(dimension.key))
        .count();
    if known == 0 {
        return Err("response names none of the rubric dimensions".to_string());
    }

    let mut corrections = Vec::new();
    let dimensions = DIMENSIONS
        .iter()
        .map(|dimension| {
            validate_dimension(dimension, reported.get(dimension.key), &mut corrections)
        })
        .collect::<Vec<DimensionResult>>();

    let mut unknown = reported
        .keys()
        .filter(|key| RubricDimension::by_key(key).is_none())
        .collect::<Vec<&String>>();
    unknown.sort();
    corrections.extend(unknown.into_iter().map(|key| ScoreCorrection {
        dimension: key.clone(),
        kind: CorrectionKind::UnknownDimension,
        reported: reported.get(key).and_then(score_value),
        applied: None,
    }));

    Ok(ValidatedResponse {
        dimensions,
        corrections,
        strengths: string_list(object.get("strengths")),
        feedback: object
            .get("feedback")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn score_value(entry: &Value) -> Option<f64> {
    match entry {
        Value::Number(number) => number.as_f64(),
        Value::Object(fields) => fields.get("score").and_then(Value::as_f64),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn validate_dimension(
    dimension: &RubricDimension,
    entry: Option<&Value>,
    corrections: &mut Vec<ScoreCorrection>,
) -> DimensionResult {
    let empty = Map::new();
    let fields = entry.and_then(Value::as_object).unwrap_or(&empty);
    let reported = entry.and_then(score_value).filter(|score| score.is_finite());

    let score = match reported {
        Some(reported) => {
            let (applied, kind) = clamp_score(reported, dimension.ceiling);
            if let Some(kind) = kind {
                corrections.push(ScoreCorrection {
                    dimension: dimension.key.to_string(),
                    kind,
                    reported: Some(reported),
                    applied: Some(applied),
                });
            }
            applied
        }
        None => {
            corrections.push(ScoreCorrection {
                dimension: dimension.key.to_string(),
                kind: CorrectionKind::Missing,
                reported: None,
                applied: Some(0),
            });
            0
        }
    };

    DimensionResult {
        key: dimension.key.to_string(),
        label: dimension.label.to_string(),
        ceiling: dimension.ceiling,
        score: Some(score),
        strengths: string_list(fields.get("strengths")),
        gaps: string_list(fields.get("gaps")),
        feedback: fields
            .get("feedback")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

pub fn clamp_score(reported: f64, ceiling: u32) -> (u32, Option<CorrectionKind>) {
    let rounded = reported.round();
    if rounded < 0.0 {
        (0, Some(CorrectionKind::BelowZero))
    } else if rounded > f64::from(ceiling) {
        (ceiling, Some(CorrectionKind::AboveCeiling))
    } else if rounded != reported {
        (rounded as u32, Some(CorrectionKind::Rounded))
    } else {
        (rounded as u32, None)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn confidence_tier(dimensions: &[DimensionResult], aggregate: u32) -> ConfidenceTier {
    let non_zero = dimensions
        .iter()
        .filter(|dimension| dimension.score.unwrap_or(0) > 0)
        .count();
    if non_zero >= 6 && aggregate > 40 {
        ConfidenceTier::High
    } else if non_zero >= 4 && aggregate > 20 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

fn band_feedback(grade: Grade, aggregate: u32) -> String {
    match grade {
        Grade::A => format!(
            "Exemplary RCA ({aggregate}/100) that demonstrates engineering excellence and should serve as a template for future incident analysis."
        ),
        Grade::B => format!(
            "Good quality RCA ({aggregate}/100) with strong foundation and only minor improvements needed."
        ),
        Grade::C => format!(
            "Adequate RCA ({aggregate}/100) that covers basics but has several areas for improvement to reach best practices."
        ),
        Grade::D => format!(
            "Poor quality RCA ({aggregate}/100) with significant gaps that undermine its effectiveness for learning and prevention."
        ),
        Grade::F => format!(
            "Inadequate RCA ({aggregate}/100) that fails to meet basic incident analysis standards and requires major revision."
        ),
    }
}

fn top_strengths(dimensions: &[DimensionResult], overall: &[String]) -> Vec<String> {
    dimensions
        .iter()
        .flat_map(|dimension| {
            dimension
                .strengths
                .iter()
                .map(move |strength| format!("{}: {strength}", dimension.label))
        })
        .chain(overall.iter().cloned())
        .take(TOP_STRENGTHS)
        .collect()
}

fn below_share(dimension: &DimensionResult, share: f64) -> bool {
    f64::from(dimension.score.unwrap_or(0)) < f64::from(dimension.ceiling) * share
}

fn critical_gaps(dimensions: &[DimensionResult]) -> Vec<String> {
    let root_cause = dimensions
        .iter()
        .filter(|dimension| dimension.key == rubric::ROOT_CAUSE_ANALYSIS)
        .flat_map(|dimension| {
            dimension
                .gaps
                .iter()
                .take(2)
                .map(move |gap| format!("{}: {gap}", dimension.label))
        });
    let others = dimensions
        .iter()
        .filter(|dimension| dimension.key != rubric::ROOT_CAUSE_ANALYSIS)
        .filter(|dimension| below_share(dimension, 0.6))
        .filter_map(|dimension| {
            dimension
                .gaps
                .first()
                .map(|gap| format!("{}: {gap}", dimension.label))
        });
    root_cause.chain(others).take(CRITICAL_GAPS).collect()
}

fn recommendations(dimensions: &[DimensionResult], grade: Grade) -> Vec<String> {
    let band: &[&str] = match grade {
        Grade::D | Grade::F => &[
            "Focus on structured RCA methodology - implement 5 Whys or fishbone analysis",
            "Add dedicated sections: Timeline, Impact, Root Cause, Action Items",
            "Quantify user and business impact with specific numbers",
        ],
        Grade::C => &[
            "Deepen root cause analysis - go beyond immediate causes to underlying factors",
            "Add prevention-focused action items with clear ownership and timelines",
            "Include lessons learned section for broader organizational value",
        ],
        Grade::B => &[
            "Enhance technical depth in root cause analysis",
            "Strengthen prevention focus in action items",
            "Consider adding executive summary for leadership communication",
        ],
        Grade::A => &[],
    };
    let mut advice = band.iter().map(|line| line.to_string()).collect::<Vec<_>>();

    let weakest = dimensions
        .iter()
        .filter(|dimension| dimension.ceiling > 0)
        .min_by(|left, right| {
            let left_share = f64::from(left.score.unwrap_or(0)) / f64::from(left.ceiling);
            let right_share = f64::from(right.score.unwrap_or(0)) / f64::from(right.ceiling);
            left_share.total_cmp(&right_share)
        });
    if let Some(weakest) = weakest.filter(|dimension| below_share(dimension, 0.7)) {
        advice.push(format!(
            "Priority improvement area: {} - {}",
            weakest.label,
            weakest
                .gaps
                .first()
                .map(String::as_str)
                .unwrap_or("needs attention")
        ));
    }
    advice.truncate(RECOMMENDATIONS);
    advice
}
