use std::collections::HashMap;
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::cache::AssessmentCache;
use crate::error::SourceError;
use crate::insights;
use crate::linker::{LinkerSettings, RcaLinker};
use crate::model::{Incident, RcaLink};
use crate::normalize::normalize_markup;
use crate::report::{LinkStatus, ProcessingOutcome};
use crate::scoring::{QualityAssessment, QualityScorer, content_fingerprint};
use crate::sources::DocumentSource;

pub(super) const CONTENT_UNAVAILABLE: &str = "document content unavailable";

#[derive(Debug, Clone)]
pub(super) struct PipelineSettings {
    pub workers: usize,
    pub deadline: Option<Instant>,
    pub keep_content: bool,
    pub policy_checksum: String,
}

#[derive(Debug, Default)]
pub(super) struct PipelineOutput {
    pub links: HashMap<String, RcaLink>,
    pub assessments: HashMap<String, QualityAssessment>,
    pub outcomes: HashMap<String, ProcessingOutcome>,
    pub warnings: Vec<String>,
}

struct IncidentResult {
    key: String,
    link: RcaLink,
    assessment: Option<QualityAssessment>,
    outcome: ProcessingOutcome,
}

impl IncidentResult {
    fn new(incident: &Incident, link: RcaLink, status: LinkStatus) -> Self {
        Self {
            key: incident.key.clone(),
            link,
            assessment: None,
            outcome: ProcessingOutcome::new(status),
        }
    }
}

pub(super) struct Pipeline<'a> {
    pub documents: &'a dyn DocumentSource,
    pub linker: &'a LinkerSettings,
    pub scorer: Option<&'a QualityScorer<'a>>,
    pub cache: Option<&'a AssessmentCache>,
    pub settings: PipelineSettings,
}

impl Pipeline<'_> {
    pub fn run(&self, incidents: &[Incident]) -> Result<PipelineOutput> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.workers.max(1))
            .build()
            .context("failed to build report worker pool")?;

        let results = pool
            .install(|| {
                incidents
                    .par_iter()
                    .map(|incident| self.process(incident))
                    .collect::<Result<Vec<IncidentResult>, SourceError>>()
            })
            .context("batch aborted: upstream rejected credentials")?;

        let mut output = PipelineOutput::default();
        for result in results {
            if let Some(error) = &result.outcome.error {
                output.warnings.push(format!("{}: {error}", result.key));
            }
            if let Some(assessment) = result.assessment {
                output.assessments.insert(result.key.clone(), assessment);
            }
            output.links.insert(result.key.clone(), result.link);
            output.outcomes.insert(result.key, result.outcome);
        }
        Ok(output)
    }

    fn process(&self, incident: &Incident) -> Result<IncidentResult, SourceError> {
        if self
            .settings
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
        {
            debug!(ticket_key = %incident.key, "batch deadline passed before start");
            return Ok(IncidentResult::new(
                incident,
                RcaLink::unresolved(),
                LinkStatus::TimedOut,
            ));
        }

        let linker = RcaLinker::new(self.documents, self.linker);
        let link = match linker.link(incident) {
            Ok(link) => link,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) if err.is_not_found() => {
                debug!(ticket_key = %incident.key, error = %err, "rca lookup found nothing");
                return Ok(IncidentResult::new(
                    incident,
                    RcaLink::unresolved(),
                    LinkStatus::Unresolved,
                ));
            }
            Err(err) => {
                warn!(ticket_key = %incident.key, error = %err, "rca lookup failed");
                let mut result =
                    IncidentResult::new(incident, RcaLink::unresolved(), LinkStatus::Error);
                result.outcome.error = Some(err.to_string());
                return Ok(result);
            }
        };

        let Some(reference) = link.reference.clone() else {
            debug!(ticket_key = %incident.key, "no rca document found");
            return Ok(IncidentResult::new(incident, link, LinkStatus::Unresolved));
        };
        debug!(
            ticket_key = %incident.key,
            provenance = %link.provenance,
            document_id = %reference.document_id,
            "rca linked"
        );

        let mut result = IncidentResult::new(incident, link, LinkStatus::Linked);
        let raw_markup = match self.documents.fetch_content(&reference.document_id) {
            Ok(raw_markup) => raw_markup,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                let reason = if err.is_not_found() {
                    CONTENT_UNAVAILABLE.to_string()
                } else {
                    format!("{CONTENT_UNAVAILABLE}: {err}")
                };
                warn!(ticket_key = %incident.key, error = %err, "rca content fetch failed");
                result.outcome.error = Some(err.to_string());
                result.assessment = self.scorer.map(|scorer| {
                    QualityAssessment::failed(scorer.backend_id(), String::new(), reason)
                });
                return Ok(result);
            }
        };

        let normalized = normalize_markup(&raw_markup);
        if normalized.fallback_used {
            debug!(ticket_key = %incident.key, "markup stripping fell back to raw text");
        }

        result.outcome.insights = Some(insights::analyze(&normalized.text, incident));
        if let Some(scorer) = self.scorer {
            let (assessment, cache_hit) = self.assess(scorer, incident, &normalized.text);
            result.outcome.cache_hit = cache_hit;
            if !assessment.is_scored() {
                warn!(
                    ticket_key = %incident.key,
                    reason = assessment.failure_reason.as_deref().unwrap_or("unknown"),
                    "quality assessment failed"
                );
            }
            result.assessment = Some(assessment);
        }
        if self.settings.keep_content {
            result.outcome.content_text = Some(normalized.text);
        }
        Ok(result)
    }

    fn assess(
        &self,
        scorer: &QualityScorer<'_>,
        incident: &Incident,
        text: &str,
    ) -> (QualityAssessment, bool) {
        let checksum = self.settings.policy_checksum.as_str();
        if let Some(cache) = self.cache {
            let fingerprint = content_fingerprint(text);
            match cache.get(&fingerprint, scorer.backend_id(), checksum) {
                Ok(Some(cached)) => return (cached, true),
                Ok(None) => {}
                Err(err) => {
                    warn!(ticket_key = %incident.key, error = %err, "assessment cache read failed");
                }
            }
        }

        let assessment = scorer.assess(text);
        if let Some(cache) = self.cache {
            if let Err(err) = cache.put(checksum, &assessment) {
                warn!(ticket_key = %incident.key, error = %err, "assessment cache write failed");
            }
        }
        (assessment, false)
    }
}
