pub mod confluence;
pub mod http;
pub mod jira;
pub mod throttle;

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::SourceError;
use crate::model::{Comment, DocumentRef, Incident};

#[derive(Clone)]
pub struct ServiceCredentials {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentQuery {
    pub project: String,
    pub created_after: NaiveDate,
    pub excluded_statuses: Vec<String>,
}

impl IncidentQuery {
    pub fn to_jql(&self) -> String {
        let mut jql = format!(
            "project = {} AND created >= \"{}\"",
            quote_if_needed(&self.project),
            self.created_after.format("%Y-%m-%d")
        );
        if !self.excluded_statuses.is_empty() {
            let statuses = self
                .excluded_statuses
                .iter()
                .map(|status| format!("\"{}\"", escape_query_string(status)))
                .collect::<Vec<String>>()
                .join(", ");
            jql.push_str(&format!(" AND status NOT IN ({statuses})"));
        }
        jql.push_str(" ORDER BY created ASC");
        jql
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

pub fn escape_query_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn quote_if_needed(value: &str) -> String {
    if value.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        value.to_string()
    } else {
        format!("\"{}\"", escape_query_string(value))
    }
}

pub trait TicketSource: Send + Sync {
    fn search(&self, query: &IncidentQuery) -> Result<Vec<Incident>, SourceError>;

    fn fetch_comments(&self, incident_key: &str) -> Result<Vec<Comment>, SourceError>;
}

pub trait DocumentSource: Send + Sync {
    fn search_by_title_prefix(
        &self,
        space: &str,
        prefix: &str,
    ) -> Result<Vec<DocumentRef>, SourceError>;

    fn fetch_content(&self, document_id: &str) -> Result<String, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jql_carries_project_date_and_exclusions() {
        let query = IncidentQuery {
            project: "IR".to_string(),
            created_after: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
            excluded_statuses: vec!["Duplicate".to_string(), "Not an Incident".to_string()],
        };
        assert_eq!(
            query.to_jql(),
            "project = IR AND created >= \"2024-01-01\" AND status NOT IN (\"Duplicate\", \"Not an Incident\") ORDER BY created ASC"
        );
    }

    #[test]
    fn jql_quotes_unusual_values() {
        let query = IncidentQuery {
            project: "Ops Team".to_string(),
            created_after: NaiveDate::from_ymd_opt(2025, 6, 30).expect("valid date"),
            excluded_statuses: vec!["Won\"t Fix".to_string()],
        };
        let jql = query.to_jql();
        assert!(jql.starts_with("project = \"Ops Team\" AND"));
        assert!(jql.contains("(\"Won\\\"t Fix\")"));
    }

    #[test]
    fn timestamps_parse_in_both_atlassian_forms() {
        let jira = parse_timestamp("2024-03-01T10:15:30.000+0000").expect("jira timestamp");
        let wiki = parse_timestamp("2024-03-01T10:15:30.000Z").expect("wiki timestamp");
        assert_eq!(jira, wiki);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn credentials_debug_hides_token() {
        let credentials = ServiceCredentials {
            base_url: "https://acme.atlassian.net".to_string(),
            email: "ops@acme.test".to_string(),
            api_token: "secret-token".to_string(),
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("redacted"));
    }
}
