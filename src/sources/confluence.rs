use serde::Deserialize;
use tracing::debug;

use super::http::{HttpTransport, join_url};
use super::{DocumentSource, escape_query_string, parse_timestamp};
use crate::error::SourceError;
use crate::model::DocumentRef;

const TITLE_SEARCH_LIMIT: usize = 25;
const LISTING_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawPage>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    version: Option<RawVersion>,
    #[serde(rename = "_links", default)]
    links: RawLinks,
}

#[derive(Debug, Deserialize)]
struct RawVersion {
    #[serde(default)]
    when: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLinks {
    #[serde(default)]
    webui: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(default)]
    body: Option<RawBody>,
}

#[derive(Debug, Deserialize)]
struct RawBody {
    storage: RawStorage,
}

#[derive(Debug, Deserialize)]
struct RawStorage {
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaceInfo {
    pub key: String,
    #[serde(default)]
    pub name: String,
}

pub struct ConfluenceClient {
    transport: HttpTransport,
}

impl ConfluenceClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub fn check_connection(&self) -> Result<(), SourceError> {
        let _: serde_json::Value = self
            .transport
            .get_json("rest/api/space", &[("limit", "1".to_string())])?;
        Ok(())
    }

    pub fn space(&self, space_key: &str) -> Result<SpaceInfo, SourceError> {
        self.transport
            .get_json(&format!("rest/api/space/{space_key}"), &[])
    }

    pub fn list_pages(
        &self,
        space: &str,
        title_query: &str,
    ) -> Result<Vec<DocumentRef>, SourceError> {
        let cql = title_cql(space, title_query);
        let mut pages = Vec::new();
        let mut start = 0usize;
        loop {
            let response: SearchResponse = self.transport.get_json(
                "rest/api/content/search",
                &[
                    ("cql", cql.clone()),
                    ("expand", "version".to_string()),
                    ("start", start.to_string()),
                    ("limit", LISTING_PAGE_SIZE.to_string()),
                ],
            )?;
            let returned = response.results.len();
            pages.extend(
                response
                    .results
                    .into_iter()
                    .map(|page| page_ref(page, self.transport.base_url())),
            );
            if returned < LISTING_PAGE_SIZE {
                break;
            }
            start += returned;
        }
        Ok(pages)
    }
}

impl DocumentSource for ConfluenceClient {
    fn search_by_title_prefix(
        &self,
        space: &str,
        prefix: &str,
    ) -> Result<Vec<DocumentRef>, SourceError> {
        let response: SearchResponse = self.transport.get_json(
            "rest/api/content/search",
            &[
                ("cql", title_cql(space, prefix)),
                ("expand", "version".to_string()),
                ("limit", TITLE_SEARCH_LIMIT.to_string()),
            ],
        )?;
        debug!(
            space,
            prefix,
            count = response.results.len(),
            "title search returned candidates"
        );
        Ok(response
            .results
            .into_iter()
            .map(|page| page_ref(page, self.transport.base_url()))
            .collect())
    }

    fn fetch_content(&self, document_id: &str) -> Result<String, SourceError> {
        let content: RawContent = self.transport.get_json(
            &format!("rest/api/content/{document_id}"),
            &[("expand", "body.storage,version".to_string())],
        )?;
        content
            .body
            .map(|body| body.storage.value)
            .ok_or_else(|| SourceError::Decode {
                service: self.transport.service(),
                reason: format!("content {document_id} has no storage body"),
            })
    }
}

fn title_cql(space: &str, title_query: &str) -> String {
    format!(
        "space = \"{}\" AND title ~ \"{}\"",
        escape_query_string(space),
        escape_query_string(title_query)
    )
}

fn page_ref(page: RawPage, base_url: &str) -> DocumentRef {
    let url = match page.links.webui.as_deref() {
        Some(webui) => join_url(base_url, webui),
        None => join_url(
            base_url,
            &format!("pages/viewpage.action?pageId={}", page.id),
        ),
    };
    DocumentRef {
        last_modified: page
            .version
            .and_then(|version| version.when)
            .as_deref()
            .and_then(parse_timestamp),
        id: page.id,
        title: page.title,
        url,
    }
}
