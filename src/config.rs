use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::linker::{KEY_PLACEHOLDER, LinkerSettings};
use crate::report::ReportSchema;
use crate::scoring::ScorerLimits;
use crate::scoring::grading::GradingPolicy;
use crate::sources::IncidentQuery;
use crate::sources::http::RetryPolicy;
use crate::sources::jira::FieldMapping;
use crate::sources::throttle::RateLimitPolicy;
use crate::util::sha256_hex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunPolicy {
    pub project: String,
    pub excluded_statuses: Vec<String>,
    pub automation_identity: String,
    pub rca_space: String,
    pub title_prefix_template: String,
    pub fields: FieldMapping,
    pub grading: GradingPolicy,
    pub rate_limit: RateLimitPolicy,
    pub retry: RetryPolicy,
    pub columns: ReportSchema,
    pub max_document_chars: usize,
    pub min_content_chars: usize,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            project: "IR".to_string(),
            excluded_statuses: vec!["Duplicate".to_string(), "Not an Incident".to_string()],
            automation_identity: "Automation for Jira".to_string(),
            rca_space: "RND".to_string(),
            title_prefix_template: format!("RCA {KEY_PLACEHOLDER}"),
            fields: FieldMapping::default(),
            grading: GradingPolicy::default(),
            rate_limit: RateLimitPolicy::default(),
            retry: RetryPolicy::default(),
            columns: ReportSchema::default(),
            max_document_chars: 8000,
            min_content_chars: 50,
        }
    }
}

impl RunPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            bail!("policy project must not be empty");
        }
        if self.rca_space.trim().is_empty() {
            bail!("policy rca_space must not be empty");
        }
        if self.automation_identity.trim().is_empty() {
            bail!("policy automation_identity must not be empty");
        }
        if !self.title_prefix_template.contains(KEY_PLACEHOLDER) {
            bail!(
                "title_prefix_template '{}' must contain {KEY_PLACEHOLDER}",
                self.title_prefix_template
            );
        }
        if self.rate_limit.requests_per_interval == 0 {
            bail!("rate_limit.requests_per_interval must be at least 1");
        }
        if self.rate_limit.interval_ms == 0 {
            bail!("rate_limit.interval_ms must be at least 1");
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            bail!("retry.max_backoff_ms must not be below retry.initial_backoff_ms");
        }
        if self.max_document_chars == 0 {
            bail!("max_document_chars must be at least 1");
        }
        self.grading
            .validate()
            .context("invalid grading thresholds")?;
        self.columns.validate().context("invalid report columns")?;
        Ok(())
    }

    pub fn checksum(&self) -> Result<String> {
        let canonical = serde_json::to_string(self).context("failed to serialize run policy")?;
        Ok(sha256_hex(&[&canonical]))
    }

    pub fn incident_query(&self, created_after: NaiveDate) -> IncidentQuery {
        IncidentQuery {
            project: self.project.clone(),
            created_after,
            excluded_statuses: self.excluded_statuses.clone(),
        }
    }

    pub fn linker_settings(&self) -> LinkerSettings {
        LinkerSettings {
            automation_identity: self.automation_identity.clone(),
            space: self.rca_space.clone(),
            title_prefix_template: self.title_prefix_template.clone(),
        }
    }

    pub fn scorer_limits(&self) -> ScorerLimits {
        ScorerLimits {
            max_document_chars: self.max_document_chars,
            min_content_chars: self.min_content_chars,
        }
    }
}

pub fn load_policy(path: Option<&Path>) -> Result<RunPolicy> {
    let policy = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read policy file: {}", path.display()))?;
            serde_json::from_str::<RunPolicy>(&raw)
                .with_context(|| format!("failed to parse policy file: {}", path.display()))?
        }
        None => RunPolicy::default(),
    };
    policy.validate()?;
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::report::Column;

    fn write_policy(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("policy.json");
        fs::write(&path, contents).expect("write policy");
        (dir, path)
    }

    #[test]
    fn defaults_are_valid() {
        let policy = load_policy(None).expect("default policy");
        assert_eq!(policy.project, "IR");
        assert_eq!(policy.rca_space, "RND");
        assert_eq!(policy.linker_settings().title_prefix_template, "RCA {key}");
        assert_eq!(policy.scorer_limits().min_content_chars, 50);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let (_dir, path) = write_policy(
            r#"{
                "project": "OPS",
                "rate_limit": {"requests_per_interval": 2},
                "columns": ["ticket_key", "grade"],
                "grading": {"thresholds": [
                    {"grade": "A", "min_score": 85},
                    {"grade": "C", "min_score": 50}
                ]}
            }"#,
        );
        let policy = load_policy(Some(&path)).expect("policy");
        assert_eq!(policy.project, "OPS");
        assert_eq!(policy.rate_limit.requests_per_interval, 2);
        assert_eq!(policy.rate_limit.interval_ms, 1000);
        assert_eq!(policy.columns.columns, vec![Column::TicketKey, Column::Grade]);
        assert_eq!(policy.automation_identity, "Automation for Jira");
    }

    #[test]
    fn invalid_policies_are_rejected() {
        for contents in [
            r#"{"project": " "}"#,
            r#"{"title_prefix_template": "RCA"}"#,
            r#"{"rate_limit": {"requests_per_interval": 0}}"#,
            r#"{"columns": []}"#,
            r#"{"columns": ["ticket_key", "ticket_key"]}"#,
            r#"{"columns": ["nope"]}"#,
            r#"{"grading": {"thresholds": [{"grade": "B", "min_score": 80}, {"grade": "A", "min_score": 90}]}}"#,
            r#"{"unknown_field": true}"#,
        ] {
            let (_dir, path) = write_policy(contents);
            assert!(load_policy(Some(&path)).is_err(), "accepted {contents}");
        }
    }

    #[test]
    fn checksum_tracks_policy_content() {
        let base = RunPolicy::default();
        let mut changed = RunPolicy::default();
        changed.rca_space = "OPS".to_string();
        assert_eq!(
            base.checksum().expect("checksum"),
            RunPolicy::default().checksum().expect("checksum")
        );
        assert_ne!(
            base.checksum().expect("checksum"),
            changed.checksum().expect("checksum")
        );
    }

    #[test]
    fn incident_query_carries_exclusions() {
        let policy = RunPolicy::default();
        let query = policy.incident_query(NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"));
        assert_eq!(
            query.to_jql(),
            "project = IR AND created >= \"2024-01-01\" AND status NOT IN (\"Duplicate\", \"Not an Incident\") ORDER BY created ASC"
        );
    }
}
