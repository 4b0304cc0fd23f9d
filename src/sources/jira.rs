use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::http::HttpTransport;
use super::{IncidentQuery, TicketSource, parse_timestamp};
use crate::error::SourceError;
use crate::model::{
    Comment, CommentAuthor, Incident, IncidentStatus, Priority, is_valid_incident_key,
};

const SEARCH_PAGE_SIZE: usize = 50;
const COMMENT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldMapping {
    pub urgency: String,
    pub teams_engaged: String,
    pub team_responsible: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            urgency: "customfield_11450".to_string(),
            teams_engaged: "customfield_11488".to_string(),
            team_responsible: "customfield_11697".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    issues: Vec<RawIssue>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    key: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CommentPage {
    #[serde(default)]
    comments: Vec<Value>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Myself {
    pub display_name: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

struct ParsedIssue {
    incident: Incident,
    comments_truncated: bool,
}

pub struct JiraClient {
    transport: HttpTransport,
    fields: FieldMapping,
}

impl JiraClient {
    pub fn new(transport: HttpTransport, fields: FieldMapping) -> Self {
        Self { transport, fields }
    }

    pub fn myself(&self) -> Result<Myself, SourceError> {
        self.transport.get_json("rest/api/2/myself", &[])
    }

    fn requested_fields(&self) -> String {
        [
            "summary",
            "description",
            "created",
            "status",
            "comment",
            self.fields.urgency.as_str(),
            self.fields.teams_engaged.as_str(),
            self.fields.team_responsible.as_str(),
        ]
        .join(",")
    }
}

impl TicketSource for JiraClient {
    fn search(&self, query: &IncidentQuery) -> Result<Vec<Incident>, SourceError> {
        let jql = query.to_jql();
        let fields = self.requested_fields();
        info!(jql = %jql, "searching incidents");

        let mut incidents = Vec::new();
        let mut start_at = 0usize;
        loop {
            let page: SearchPage = self.transport.get_json(
                "rest/api/2/search",
                &[
                    ("jql", jql.clone()),
                    ("startAt", start_at.to_string()),
                    ("maxResults", SEARCH_PAGE_SIZE.to_string()),
                    ("fields", fields.clone()),
                ],
            )?;
            if page.issues.is_empty() {
                break;
            }

            let returned = page.issues.len();
            for issue in &page.issues {
                let parsed = match parse_issue(issue, &self.fields) {
                    Ok(parsed) => parsed,
                    Err(reason) => {
                        warn!(ticket_key = %issue.key, reason = %reason, "skipping malformed issue");
                        continue;
                    }
                };

                let mut incident = parsed.incident;
                if parsed.comments_truncated {
                    match self.fetch_comments(&incident.key) {
                        Ok(comments) => incident.comments = comments,
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => warn!(
                            ticket_key = %incident.key,
                            error = %err,
                            "keeping embedded comments after full comment fetch failed"
                        ),
                    }
                }
                incidents.push(incident);
            }

            match next_start(start_at, returned, page.total) {
                Some(next) => start_at = next,
                None => break,
            }
        }

        info!(count = incidents.len(), "retrieved incidents");
        Ok(incidents)
    }

    fn fetch_comments(&self, incident_key: &str) -> Result<Vec<Comment>, SourceError> {
        let path = format!("rest/api/2/issue/{incident_key}/comment");
        let mut comments = Vec::new();
        let mut start_at = 0usize;
        loop {
            let page: CommentPage = self.transport.get_json(
                &path,
                &[
                    ("startAt", start_at.to_string()),
                    ("maxResults", COMMENT_PAGE_SIZE.to_string()),
                    ("orderBy", "created".to_string()),
                ],
            )?;
            if page.comments.is_empty() {
                break;
            }
            comments.extend(page.comments.iter().map(parse_comment));
            match next_start(start_at, page.comments.len(), page.total) {
                Some(next) => start_at = next,
                None => break,
            }
        }

        debug!(ticket_key = incident_key, count = comments.len(), "fetched comments");
        Ok(comments)
    }
}

// Servers may return fewer issues than maxResults.
fn next_start(start_at: usize, returned: usize, total: usize) -> Option<usize> {
    let next = start_at + returned;
    (returned > 0 && next < total).then_some(next)
}

fn parse_issue(issue: &RawIssue, mapping: &FieldMapping) -> Result<ParsedIssue, String> {
    if !is_valid_incident_key(&issue.key) {
        return Err(format!("invalid incident key: {}", issue.key));
    }
    let fields = &issue.fields;

    let created_raw = fields
        .get("created")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing created timestamp".to_string())?;
    let created = parse_timestamp(created_raw)
        .ok_or_else(|| format!("unparseable created timestamp: {created_raw}"))?;

    let status = fields
        .get("status")
        .and_then(|status| status.get("name"))
        .and_then(Value::as_str)
        .map(IncidentStatus::from_name)
        .unwrap_or_else(|| IncidentStatus::Other(String::new()));

    let priority = fields
        .get(&mapping.urgency)
        .and_then(option_label)
        .and_then(|label| Priority::parse_label(&label));

    let mut teams = BTreeSet::new();
    if let Some(engaged) = fields.get(&mapping.teams_engaged) {
        teams.extend(option_labels(engaged));
    }
    if let Some(responsible) = fields.get(&mapping.team_responsible).and_then(option_label) {
        teams.insert(responsible);
    }

    let comment_block = fields.get("comment");
    let comments = comment_block
        .and_then(|block| block.get("comments"))
        .and_then(Value::as_array)
        .map(|items| items.iter().map(parse_comment).collect::<Vec<Comment>>())
        .unwrap_or_default();
    let comment_total = comment_block
        .and_then(|block| block.get("total"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;

    Ok(ParsedIssue {
        comments_truncated: comment_total > comments.len(),
        incident: Incident {
            key: issue.key.clone(),
            title: fields
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            priority,
            description: fields.get("description").map(rich_text).unwrap_or_default(),
            teams,
            created,
            status,
            comments,
        },
    })
}

fn parse_comment(value: &Value) -> Comment {
    let author = value.get("author");
    let display_name = author
        .and_then(|author| author.get("displayName"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let account_id = author
        .and_then(|author| author.get("accountId").or_else(|| author.get("name")))
        .and_then(Value::as_str)
        .map(str::to_string);

    Comment {
        author: CommentAuthor {
            display_name,
            account_id,
        },
        body: value.get("body").map(rich_text).unwrap_or_default(),
        created: value
            .get("created")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
    }
}

fn option_label(value: &Value) -> Option<String> {
    let label = match value {
        Value::String(text) => text.clone(),
        Value::Object(object) => object
            .get("value")
            .or_else(|| object.get("name"))
            .and_then(Value::as_str)?
            .to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    let label = label.trim();
    (!label.is_empty()).then(|| label.to_string())
}

fn option_labels(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(option_label).collect(),
        other => option_label(other).into_iter().collect(),
    }
}

fn rich_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(_) => {
            let mut out = String::new();
            flatten_document_node(value, &mut out);
            out.trim().to_string()
        }
        _ => String::new(),
    }
}

fn flatten_document_node(node: &Value, out: &mut String) {
    let node_type = node.get("type").and_then(Value::as_str).unwrap_or_default();
    match node_type {
        "text" => {
            if let Some(text) = node.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
            let hrefs = node
                .get("marks")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter(|mark| mark.get("type").and_then(Value::as_str) == Some("link"))
                .filter_map(|mark| mark.pointer("/attrs/href").and_then(Value::as_str));
            for href in hrefs {
                out.push(' ');
                out.push_str(href);
                out.push(' ');
            }
        }
        "inlineCard" | "blockCard" | "embedCard" => {
            if let Some(url) = node.pointer("/attrs/url").and_then(Value::as_str) {
                out.push(' ');
                out.push_str(url);
                out.push(' ');
            }
        }
        "hardBreak" => out.push('\n'),
        _ => {}
    }

    if let Some(children) = node.get("content").and_then(Value::as_array) {
        for child in children {
            flatten_document_node(child, out);
        }
        if matches!(node_type, "paragraph" | "heading" | "listItem" | "codeBlock") {
            out.push('\n');
        }
    }
}
