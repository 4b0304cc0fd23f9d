use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::SourceError;
use crate::model::{Comment, DocumentRef, Incident, Provenance, RcaLink, RcaReference};
use crate::sources::DocumentSource;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s|\]\)"'<>]+"#).expect("valid document url regex")
});

static PAGE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:/pages/|[?&]pageId=)(\d+)").expect("valid page id regex")
});

static SLUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/pages/\d+/([^/?#]+)").expect("valid page slug regex")
});

pub const KEY_PLACEHOLDER: &str = "{key}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkerSettings {
    pub automation_identity: String,
    pub space: String,
    pub title_prefix_template: String,
}

pub struct RcaLinker<'a> {
    documents: &'a dyn DocumentSource,
    settings: &'a LinkerSettings,
}

impl<'a> RcaLinker<'a> {
    pub fn new(documents: &'a dyn DocumentSource, settings: &'a LinkerSettings) -> Self {
        Self {
            documents,
            settings,
        }
    }

    pub fn link(&self, incident: &Incident) -> Result<RcaLink, SourceError> {
        if let Some(reference) =
            find_comment_link(&incident.comments, &self.settings.automation_identity)
        {
            debug!(ticket_key = %incident.key, document_id = %reference.document_id, "rca linked from comment");
            return Ok(RcaLink::resolved(Provenance::CommentLink, reference));
        }

        let prefix = title_prefix(&self.settings.title_prefix_template, &incident.key);
        let candidates = self
            .documents
            .search_by_title_prefix(&self.settings.space, &prefix)?;
        let matching = candidates
            .into_iter()
            .filter(|candidate| title_matches_prefix(&candidate.title, &prefix))
            .collect::<Vec<DocumentRef>>();
        if matching.len() > 1 {
            debug!(
                ticket_key = %incident.key,
                count = matching.len(),
                "multiple rca pages match; picking most recently modified"
            );
        }

        Ok(match select_candidate(matching) {
            Some(document) => RcaLink::resolved(
                Provenance::NamingConventionSearch,
                RcaReference {
                    document_id: document.id,
                    url: document.url,
                    title: Some(document.title),
                },
            ),
            None => RcaLink::unresolved(),
        })
    }
}

pub fn title_prefix(template: &str, key: &str) -> String {
    template.replace(KEY_PLACEHOLDER, key)
}

pub fn author_matches(comment: &Comment, identity: &str) -> bool {
    let identity = identity.trim();
    if identity.is_empty() {
        return false;
    }
    comment
        .author
        .display_name
        .to_lowercase()
        .contains(&identity.to_lowercase())
        || comment.author.account_id.as_deref() == Some(identity)
}

pub fn find_comment_link(comments: &[Comment], identity: &str) -> Option<RcaReference> {
    comments
        .iter()
        .filter(|comment| author_matches(comment, identity))
        .find_map(|comment| extract_document_reference(&comment.body))
}

pub fn extract_document_reference(body: &str) -> Option<RcaReference> {
    URL_PATTERN.find_iter(body).find_map(|found| {
        let url = found.as_str().trim_end_matches(['.', ',', ';', ':']);
        let document_id = document_id_from_url(url)?;
        Some(RcaReference {
            document_id,
            url: url.to_string(),
            title: title_from_url(url),
        })
    })
}

pub fn document_id_from_url(url: &str) -> Option<String> {
    PAGE_ID_PATTERN
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}

pub fn title_from_url(url: &str) -> Option<String> {
    let slug = SLUG_PATTERN.captures(url)?.get(1)?.as_str();
    let title = percent_decode(&slug.replace('+', " "));
    let title = title.split_whitespace().collect::<Vec<&str>>().join(" ");
    (!title.is_empty()).then_some(title)
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            let byte = std::str::from_utf8(&bytes[index + 1..index + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = byte {
                decoded.push(byte);
                index += 3;
                continue;
            }
        }
        decoded.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn squeeze_lowercase(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

// `RCA IR-36` must not match `RCA IR-360`.
pub fn title_matches_prefix(title: &str, prefix: &str) -> bool {
    let title = squeeze_lowercase(title);
    let prefix = squeeze_lowercase(prefix);
    if prefix.is_empty() {
        return false;
    }
    match title.strip_prefix(&prefix) {
        Some(rest) => !rest.chars().next().is_some_and(char::is_alphanumeric),
        None => false,
    }
}

pub fn select_candidate(mut candidates: Vec<DocumentRef>) -> Option<DocumentRef> {
    candidates.sort_by(compare_candidates);
    candidates.into_iter().next()
}

fn compare_candidates(left: &DocumentRef, right: &DocumentRef) -> Ordering {
    let by_modified = match (left.last_modified, right.last_modified) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_modified.then_with(|| compare_document_ids(&left.id, &right.id))
}

fn compare_document_ids(left: &str, right: &str) -> Ordering {
    match (left.parse::<u64>(), right.parse::<u64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}

#[cfg(test)]
mod tests;
