use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

static INCIDENT_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][A-Z0-9]*-\d+$").expect("incident key regex should compile")
});

static PRIORITY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bP([1-4])\b").expect("priority token regex should compile")
});

pub fn is_valid_incident_key(key: &str) -> bool {
    INCIDENT_KEY_PATTERN.is_match(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P1,
    P2,
    P3,
    P4,
}

impl Priority {
    pub fn parse_label(raw: &str) -> Option<Self> {
        let captures = PRIORITY_TOKEN.captures(raw)?;
        match captures.get(1)?.as_str() {
            "1" => Some(Self::P1),
            "2" => Some(Self::P2),
            "3" => Some(Self::P3),
            "4" => Some(Self::P4),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
            Self::P4 => "P4",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Duplicate,
    NotAnIncident,
    Other(String),
}

impl IncidentStatus {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "open" | "to do" => Self::Open,
            "in progress" => Self::InProgress,
            "resolved" | "done" => Self::Resolved,
            "closed" => Self::Closed,
            "duplicate" => Self::Duplicate,
            "not an incident" => Self::NotAnIncident,
            _ => Self::Other(name.trim().to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
            Self::Duplicate => "Duplicate",
            Self::NotAnIncident => "Not an Incident",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub display_name: String,
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: CommentAuthor,
    pub body: String,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub key: String,
    pub title: String,
    pub priority: Option<Priority>,
    pub description: String,
    pub teams: BTreeSet<String>,
    pub created: DateTime<Utc>,
    pub status: IncidentStatus,
    pub comments: Vec<Comment>,
}

impl Incident {
    pub fn teams_label(&self) -> String {
        self.teams.iter().cloned().collect::<Vec<String>>().join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub title: String,
    pub url: String,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    CommentLink,
    NamingConventionSearch,
    Unresolved,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommentLink => "comment-link",
            Self::NamingConventionSearch => "naming-convention-search",
            Self::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcaReference {
    pub document_id: String,
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcaLink {
    pub provenance: Provenance,
    pub reference: Option<RcaReference>,
}

impl RcaLink {
    pub fn unresolved() -> Self {
        Self {
            provenance: Provenance::Unresolved,
            reference: None,
        }
    }

    pub fn resolved(provenance: Provenance, reference: RcaReference) -> Self {
        debug_assert!(provenance != Provenance::Unresolved);
        Self {
            provenance,
            reference: Some(reference),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.reference.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parses_labelled_urgency_values() {
        assert_eq!(Priority::parse_label("P2 - High"), Some(Priority::P2));
        assert_eq!(Priority::parse_label("p1"), Some(Priority::P1));
        assert_eq!(Priority::parse_label("Urgency: P4"), Some(Priority::P4));
        assert_eq!(Priority::parse_label("P5"), None);
        assert_eq!(Priority::parse_label("Not Set"), None);
        assert!(Priority::P1 < Priority::P4);
    }

    #[test]
    fn incident_status_round_trips_known_names() {
        assert_eq!(
            IncidentStatus::from_name("Not an Incident"),
            IncidentStatus::NotAnIncident
        );
        assert_eq!(IncidentStatus::from_name("in progress").name(), "In Progress");
        assert_eq!(
            IncidentStatus::from_name("Awaiting RCA"),
            IncidentStatus::Other("Awaiting RCA".to_string())
        );
    }

    #[test]
    fn incident_key_pattern_requires_project_and_number() {
        assert!(is_valid_incident_key("IR-360"));
        assert!(is_valid_incident_key("OPS2-7"));
        assert!(!is_valid_incident_key("ir-360"));
        assert!(!is_valid_incident_key("IR360"));
        assert!(!is_valid_incident_key("IR-"));
    }

    #[test]
    fn provenance_serializes_as_kebab_case() {
        let raw = serde_json::to_string(&Provenance::NamingConventionSearch)
            .expect("provenance should serialize");
        assert_eq!(raw, "\"naming-convention-search\"");
        assert_eq!(RcaLink::unresolved().provenance.as_str(), "unresolved");
    }
}
