use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::cli::RcaListArgs;
use crate::commands::confluence_client;
use crate::config::load_policy;
use crate::linker::{KEY_PLACEHOLDER, select_candidate};
use crate::model::DocumentRef;
use crate::sources::throttle::RateGate;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RcaListEntry {
    pub ticket_key: Option<String>,
    pub page_id: String,
    pub title: String,
    pub url: String,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RcaListManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub space: String,
    pub title_query: String,
    pub document_count: usize,
    pub unkeyed_count: usize,
    pub by_ticket: BTreeMap<String, String>,
    pub documents: Vec<RcaListEntry>,
}

pub fn run(args: RcaListArgs) -> Result<()> {
    let started_ts = Utc::now();
    let policy = load_policy(args.policy_path.as_deref())?;
    let gate = Arc::new(RateGate::new(&policy.rate_limit));
    let confluence = confluence_client(&args.atlassian, &policy, gate)?;

    let title_query = listing_query(&policy.title_prefix_template, &policy.project);
    let pages = confluence
        .list_pages(&policy.rca_space, &title_query)
        .with_context(|| format!("failed to list rca pages in space {}", policy.rca_space))?;
    let manifest = build_manifest(
        &policy.rca_space,
        &title_query,
        &policy.title_prefix_template,
        pages,
    )?;

    let manifest_path = args.output_path.clone().unwrap_or_else(|| {
        args.output_dir.join(format!(
            "rca_documents_{}.json",
            utc_compact_string(started_ts)
        ))
    });
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote rca document list");
    info!(
        documents = manifest.document_count,
        tickets = manifest.by_ticket.len(),
        unkeyed = manifest.unkeyed_count,
        "rca list completed"
    );
    Ok(())
}

fn listing_query(template: &str, project: &str) -> String {
    template.replace(KEY_PLACEHOLDER, &format!("{project}-"))
}

fn key_pattern(template: &str) -> Result<Regex> {
    let lead = template
        .split(KEY_PLACEHOLDER)
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<String>>()
        .join(r"\s+");
    Regex::new(&format!(r"(?i)^\s*{lead}\s*([a-z][a-z0-9]*-\d+)\b"))
        .with_context(|| format!("failed to compile key pattern for template '{template}'"))
}

fn build_manifest(
    space: &str,
    title_query: &str,
    template: &str,
    pages: Vec<DocumentRef>,
) -> Result<RcaListManifest> {
    let pattern = key_pattern(template)?;

    let mut grouped: BTreeMap<String, Vec<DocumentRef>> = BTreeMap::new();
    let mut documents = Vec::with_capacity(pages.len());
    for page in pages {
        let ticket_key = pattern
            .captures(&page.title)
            .map(|captures| captures[1].to_ascii_uppercase());
        documents.push(RcaListEntry {
            ticket_key: ticket_key.clone(),
            page_id: page.id.clone(),
            title: page.title.clone(),
            url: page.url.clone(),
            last_modified: page
                .last_modified
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        });
        if let Some(key) = ticket_key {
            grouped.entry(key).or_default().push(page);
        }
    }

    let by_ticket = grouped
        .into_iter()
        .filter_map(|(key, candidates)| select_candidate(candidates).map(|page| (key, page.id)))
        .collect::<BTreeMap<String, String>>();
    let unkeyed_count = documents
        .iter()
        .filter(|entry| entry.ticket_key.is_none())
        .count();

    Ok(RcaListManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        space: space.to_string(),
        title_query: title_query.to_string(),
        document_count: documents.len(),
        unkeyed_count,
        by_ticket,
        documents,
    })
}
