use super::*;

use std::sync::Mutex;

use chrono::{TimeZone, Utc};

use crate::model::{CommentAuthor, IncidentStatus};

struct FakeDocuments {
    pages: Vec<DocumentRef>,
    failure: Option<fn() -> SourceError>,
    searches: Mutex<Vec<String>>,
}

impl FakeDocuments {
    fn with_pages(pages: Vec<DocumentRef>) -> Self {
        Self {
            pages,
            failure: None,
            searches: Mutex::new(Vec::new()),
        }
    }

    fn search_count(&self) -> usize {
        self.searches.lock().expect("search log lock").len()
    }
}

impl DocumentSource for FakeDocuments {
    fn search_by_title_prefix(
        &self,
        _space: &str,
        prefix: &str,
    ) -> Result<Vec<DocumentRef>, SourceError> {
        self.searches
            .lock()
            .expect("search log lock")
            .push(prefix.to_string());
        if let Some(failure) = self.failure {
            return Err(failure());
        }
        Ok(self.pages.clone())
    }

    fn fetch_content(&self, document_id: &str) -> Result<String, SourceError> {
        Err(SourceError::NotFound {
            service: "confluence",
            resource: document_id.to_string(),
        })
    }
}

fn settings() -> LinkerSettings {
    LinkerSettings {
        automation_identity: "Automation for Jira".to_string(),
        space: "RND".to_string(),
        title_prefix_template: "RCA {key}".to_string(),
    }
}

fn comment(author: &str, body: &str) -> Comment {
    Comment {
        author: CommentAuthor {
            display_name: author.to_string(),
            account_id: None,
        },
        body: body.to_string(),
        created: None,
    }
}

fn incident(key: &str, comments: Vec<Comment>) -> Incident {
    Incident {
        key: key.to_string(),
        title: "Something broke".to_string(),
        priority: None,
        description: String::new(),
        teams: Default::default(),
        created: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        status: IncidentStatus::Resolved,
        comments,
    }
}

fn page(id: &str, title: &str, day: Option<u32>) -> DocumentRef {
    DocumentRef {
        id: id.to_string(),
        title: title.to_string(),
        url: format!("https://acme.atlassian.net/wiki/spaces/RND/pages/{id}"),
        last_modified: day.map(|day| Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()),
    }
}

#[test]
fn automation_comment_link_wins() {
    let documents = FakeDocuments::with_pages(vec![page("999", "RCA IR-360 Other page", Some(9))]);
    let settings = settings();
    let linker = RcaLinker::new(&documents, &settings);
    let incident = incident(
        "IR-360",
        vec![
            comment("Jane Oncall", "see https://acme.atlassian.net/wiki/pages/1"),
            comment(
                "Automation for Jira",
                "RCA created: https://acme.atlassian.net/wiki/spaces/RND/pages/1521615193/RCA+IR-360+App+crashing",
            ),
        ],
    );

    let link = linker.link(&incident).expect("link should succeed");
    let reference = link.reference.expect("reference should be present");
    assert_eq!(link.provenance, Provenance::CommentLink);
    assert_eq!(reference.document_id, "1521615193");
    assert_eq!(reference.title.as_deref(), Some("RCA IR-360 App crashing"));
    assert_eq!(documents.search_count(), 0);
}

#[test]
fn falls_back_to_single_title_match() {
    let documents = FakeDocuments::with_pages(vec![
        page("10", "RCA IR-999 Database outage", Some(2)),
        page("11", "Postmortem template", Some(3)),
    ]);
    let settings = settings();
    let linker = RcaLinker::new(&documents, &settings);

    let link = linker
        .link(&incident("IR-999", Vec::new()))
        .expect("link should succeed");
    assert_eq!(link.provenance, Provenance::NamingConventionSearch);
    assert_eq!(link.reference.expect("reference").document_id, "10");
}

#[test]
fn unresolved_when_nothing_matches() {
    let documents = FakeDocuments::with_pages(vec![page("10", "RCA IR-5000 Unrelated", Some(2))]);
    let settings = settings();
    let linker = RcaLinker::new(&documents, &settings);

    let link = linker
        .link(&incident("IR-500", Vec::new()))
        .expect("link should succeed");
    assert_eq!(link, RcaLink::unresolved());
    assert_eq!(documents.search_count(), 1);
}

#[test]
fn title_match_ignores_case_and_spacing() {
    assert!(title_matches_prefix("RCA IR-360 App crashing", "rca ir-360"));
    assert!(title_matches_prefix("rca   IR-360: App crashing", "RCA IR-360"));
    assert!(title_matches_prefix("RCA IR-360", "RCA IR-360"));
    assert!(!title_matches_prefix("RCA IR-360 App crashing", "RCA IR-36"));
    assert!(!title_matches_prefix("Draft RCA IR-360", "RCA IR-360"));
}

#[test]
fn newest_match_wins_then_lowest_id() {
    let picked = select_candidate(vec![
        page("300", "RCA IR-1 v1", Some(1)),
        page("200", "RCA IR-1 v2", Some(5)),
        page("100", "RCA IR-1 draft", None),
    ])
    .expect("a candidate");
    assert_eq!(picked.id, "200");

    let tied = select_candidate(vec![
        page("1000", "RCA IR-1 a", Some(5)),
        page("999", "RCA IR-1 b", Some(5)),
    ])
    .expect("a candidate");
    assert_eq!(tied.id, "999");
}

#[test]
fn multiple_title_matches_do_not_fail() {
    let documents = FakeDocuments::with_pages(vec![
        page("41", "RCA IR-7 first draft", Some(1)),
        page("42", "rca ir-7 final", Some(8)),
    ]);
    let settings = settings();
    let linker = RcaLinker::new(&documents, &settings);

    let link = linker
        .link(&incident("IR-7", Vec::new()))
        .expect("link should succeed");
    assert_eq!(link.reference.expect("reference").document_id, "42");
}

#[test]
fn adapter_errors_propagate_without_retry() {
    let mut documents = FakeDocuments::with_pages(Vec::new());
    documents.failure = Some(|| SourceError::Transport {
        service: "confluence",
        attempts: 4,
        reason: "connection reset".to_string(),
    });
    let settings = settings();
    let linker = RcaLinker::new(&documents, &settings);

    let err = linker
        .link(&incident("IR-8", Vec::new()))
        .expect_err("transport failure should surface");
    assert!(!err.is_fatal());
    assert_eq!(documents.search_count(), 1);
}

#[test]
fn automation_comment_without_page_id_keeps_scanning() {
    let comments = vec![
        comment("Automation for Jira", "Status page: https://status.acme.test/incidents."),
        comment(
            "automation for jira",
            "Doc (https://acme.atlassian.net/wiki/pages/viewpage.action?pageId=8812).",
        ),
    ];
    let reference = find_comment_link(&comments, "Automation for Jira").expect("a reference");
    assert_eq!(reference.document_id, "8812");
    assert_eq!(
        reference.url,
        "https://acme.atlassian.net/wiki/pages/viewpage.action?pageId=8812"
    );
}

#[test]
fn account_id_identifies_automation_author() {
    let mut bot = comment("Jira Bot", "https://acme.atlassian.net/wiki/pages/5");
    bot.author.account_id = Some("557058:automation".to_string());
    assert!(author_matches(&bot, "557058:automation"));
    assert!(!author_matches(&bot, "Automation for Jira"));
}

#[test]
fn url_extraction_trims_wiki_markup() {
    let reference =
        extract_document_reference("[RCA|https://acme.atlassian.net/wiki/pages/77/RCA+IR-3+Web%3A+down]")
            .expect("a reference");
    assert_eq!(reference.url, "https://acme.atlassian.net/wiki/pages/77/RCA+IR-3+Web%3A+down");
    assert_eq!(reference.title.as_deref(), Some("RCA IR-3 Web: down"));
}
