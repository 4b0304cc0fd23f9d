use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use super::backend::TextAnalysis;
use super::rubric;
use crate::error::AnalysisError;

pub const HEURISTIC_BACKEND_ID: &str = "heuristic";

static TIMELINE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)timeline").expect("valid timeline regex"));

static TIMESTAMPS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"\d{4}-\d{2}-\d{2}\s+\d{1,2}:\d{2}",
        r"\d{1,2}:\d{2}\s+(?:AM|PM|PST|EST|UTC)",
        r"\d{1,2}/\d{1,2}/\d{4}\s+\d{1,2}:\d{2}",
    ]
    .map(|pattern| Regex::new(pattern).expect("valid timestamp regex"))
});

static ISO_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}\s+\d{1,2}:\d{2}").expect("valid iso timestamp regex")
});

static CLOCK_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+:\d+").expect("valid clock regex"));

static RESPONSE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:time to|response time|detection time|resolution time)")
        .expect("valid response time regex")
});

static USER_IMPACT: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"(?i)\d+(?:,\d+)*\s+(?:users?|members?|customers?)",
        r"(?i)\d+(?:\.\d+)?%\s+of\s+(?:users?|members?)",
        r"(?i)(?:all|some|many)\s+(?:users?|members?)",
    ]
    .map(|pattern| Regex::new(pattern).expect("valid user impact regex"))
});

static USER_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+(?:,\d+)*\s+(?:users?|members?)").expect("valid user count regex")
});

static ANY_USER_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d+.*(?:users?|members?)").expect("valid user number regex"));

static DURATIONS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"(?i)\d+\s+(?:minutes?|hours?|mins?|hrs?)",
        r"(?i)from\s+\d+:\d+.*?to\s+\d+:\d+",
        r"(?i)lasted\s+(?:for\s+)?\d+",
    ]
    .map(|pattern| Regex::new(pattern).expect("valid duration regex"))
});

static SIMPLE_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+\s+(?:minutes?|hours?)").expect("valid simple duration regex")
});

static SUMMARY_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:executive\s+)?summary").expect("valid summary regex")
});

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid sentence regex"));

static ACTIONABLE: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"(?i)(?:will|should|must|need to)\s+\w+",
        r"(?i)by\s+\d{4}-\d{2}-\d{2}",
        r"(?i)assigned to|owner:|responsible:",
    ]
    .map(|pattern| Regex::new(pattern).expect("valid actionable regex"))
});

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

fn count_present(text: &str, needles: &[&str]) -> usize {
    needles.iter().filter(|needle| text.contains(*needle)).count()
}

fn missing<'a>(text: &str, needles: &[&'a str]) -> Vec<&'a str> {
    needles
        .iter()
        .copied()
        .filter(|needle| !text.contains(needle))
        .collect()
}

#[derive(Debug, Default)]
struct Finding {
    score: u32,
    notes: Vec<String>,
    strengths: Vec<String>,
    gaps: Vec<String>,
}

impl Finding {
    fn note(&mut self, text: impl Into<String>) {
        self.notes.push(text.into());
    }

    fn strength(&mut self, text: impl Into<String>) {
        self.strengths.push(text.into());
    }

    fn gap(&mut self, text: impl Into<String>) {
        self.gaps.push(text.into());
    }

    fn into_json(self, ceiling: u32) -> Value {
        json!({
            "score": self.score.min(ceiling),
            "feedback": self.notes.join("; "),
            "strengths": self.strengths,
            "gaps": self.gaps,
        })
    }
}

struct Document<'a> {
    raw: &'a str,
    lower: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicBackend;

impl TextAnalysis for HeuristicBackend {
    fn backend_id(&self) -> &str {
        HEURISTIC_BACKEND_ID
    }

    fn analyze(&self, _prompt: &str, document: &str) -> Result<Value, AnalysisError> {
        let doc = Document {
            raw: document,
            lower: document.to_lowercase(),
        };

        let findings = [
            (rubric::TIMELINE_DETECTION, timeline_detection(&doc)),
            (rubric::IMPACT_ASSESSMENT, impact_assessment(&doc)),
            (rubric::ROOT_CAUSE_ANALYSIS, root_cause_analysis(&doc)),
            (rubric::COMMUNICATION_CLARITY, communication_clarity(&doc)),
            (rubric::ACTION_ITEMS_PREVENTION, action_items_prevention(&doc)),
            (rubric::PROCESS_ADHERENCE, process_adherence(&doc)),
            (rubric::LEARNING_KNOWLEDGE_SHARING, learning_knowledge_sharing(&doc)),
        ];

        let mut dimensions = Map::new();
        for (key, finding) in findings {
            let ceiling = rubric::RubricDimension::by_key(key)
                .map(|dimension| dimension.ceiling)
                .unwrap_or(0);
            dimensions.insert(key.to_string(), finding.into_json(ceiling));
        }

        Ok(json!({
            "dimensions": dimensions,
            "strengths": [],
            "gaps": [],
            "feedback": "",
        }))
    }
}

fn timeline_detection(doc: &Document<'_>) -> Finding {
    let mut finding = Finding::default();
    let lower = doc.lower.as_str();

    if TIMELINE_WORD.is_match(doc.raw) {
        finding.score += 4;
        finding.note("Timeline section present");
        let timestamps: usize = TIMESTAMPS
            .iter()
            .map(|pattern| pattern.find_iter(doc.raw).count())
            .sum();
        if timestamps >= 5 {
            finding.score += 6;
            finding.note("Detailed timeline with multiple timestamps");
        } else if timestamps >= 2 {
            finding.score += 3;
            finding.note("Basic timeline with some timestamps");
        } else {
            finding.note("Timeline lacks sufficient timestamp detail");
        }
    } else {
        finding.note("Missing dedicated timeline section");
    }

    if contains_any(
        lower,
        &["alert", "monitor", "detect", "notice", "discover", "pingdom", "datadog", "alarm"],
    ) {
        finding.score += 3;
        finding.note("Detection methods described");
    } else {
        finding.note("Detection methods not clearly described");
    }

    if RESPONSE_TIME.is_match(doc.raw) {
        finding.score += 2;
        finding.note("Response time analysis included");
    } else {
        finding.note("Missing response time analysis");
    }

    if ISO_TIMESTAMP.is_match(doc.raw) {
        finding.strength("Detailed timestamps provided");
    }
    if lower.contains("timeline") {
        finding.strength("Dedicated timeline section");
    }
    if contains_any(lower, &["alert", "monitor", "detect"]) {
        finding.strength("Detection methods described");
    }

    if finding.score < 8 {
        if !lower.contains("timeline") {
            finding.gap("Missing dedicated timeline section");
        }
        if !CLOCK_TIME.is_match(doc.raw) {
            finding.gap("Lacks specific timestamps");
        }
        if !contains_any(lower, &["detect", "alert", "monitor"]) {
            finding.gap("Detection methods not described");
        }
    }
    finding
}

fn impact_assessment(doc: &Document<'_>) -> Finding {
    let mut finding = Finding::default();
    let lower = doc.lower.as_str();

    if lower.contains("impact") {
        finding.score += 3;
        finding.note("Impact section present");

        if USER_IMPACT.iter().any(|pattern| pattern.is_match(doc.raw)) {
            finding.score += 5;
            finding.note("User impact quantified");
        } else {
            finding.note("User impact not quantified");
        }

        if contains_any(lower, &["business", "revenue", "sla", "availability", "downtime", "cost"]) {
            finding.score += 4;
            finding.note("Business impact addressed");
        } else {
            finding.note("Business impact not clearly addressed");
        }

        if DURATIONS.iter().any(|pattern| pattern.is_match(doc.raw)) {
            finding.score += 3;
            finding.note("Impact duration specified");
        } else {
            finding.note("Impact duration not clearly specified");
        }
    } else {
        finding.note("Missing dedicated impact section");
    }

    if USER_COUNT.is_match(doc.raw) {
        finding.strength("User impact quantified with numbers");
    }
    if contains_any(lower, &["business", "revenue", "sla"]) {
        finding.strength("Business impact addressed");
    }
    if SIMPLE_DURATION.is_match(doc.raw) {
        finding.strength("Impact duration specified");
    }

    if finding.score < 8 {
        if !ANY_USER_NUMBER.is_match(doc.raw) {
            finding.gap("User impact not quantified");
        }
        if !contains_any(lower, &["business", "revenue", "cost"]) {
            finding.gap("Business impact not addressed");
        }
        if !SIMPLE_DURATION.is_match(doc.raw) {
            finding.gap("Impact duration not specified");
        }
    }
    finding
}

fn root_cause_analysis(doc: &Document<'_>) -> Finding {
    let mut finding = Finding::default();
    let lower = doc.lower.as_str();
    let why_count = lower.matches("why").count();

    if contains_any(lower, &["root cause", "why did this happen", "5 whys", "cause analysis"]) {
        finding.score += 5;
        finding.note("Root cause analysis section present");

        let methodology = ["5 whys", "why", "fishbone", "fault tree", "contributing factor"]
            .into_iter()
            .find(|method| lower.contains(method));
        match methodology {
            Some(method) if method == "5 whys" || why_count >= 3 => {
                finding.score += 8;
                finding.note("Structured methodology (5 Whys) used");
            }
            Some(_) => {
                finding.score += 4;
                finding.note("Some structured approach attempted");
            }
            None => finding.note("No clear structured RCA methodology used"),
        }

        let factors = count_present(
            lower,
            &["immediate cause", "contributing", "underlying", "secondary", "primary"],
        );
        if factors >= 3 {
            finding.score += 6;
            finding.note("Multiple contributing factors identified");
        } else if factors >= 1 {
            finding.score += 3;
            finding.note("Some contributing factors identified");
        } else {
            finding.note("Limited identification of contributing factors");
        }

        let depth = count_present(
            lower,
            &[
                "configuration", "deployment", "code", "database", "server", "api", "network",
                "timeout", "error", "exception", "log", "monitoring",
            ],
        );
        if depth >= 5 {
            finding.score += 4;
            finding.note("Good technical depth in analysis");
        } else if depth >= 2 {
            finding.score += 2;
            finding.note("Adequate technical detail");
        } else {
            finding.note("Lacks sufficient technical depth");
        }

        let blame = count_present(
            lower,
            &["human error", "forgot", "mistake", "careless", "should have"],
        );
        let systems = count_present(
            lower,
            &["process", "system", "automation", "procedure", "design"],
        );
        if systems > blame && systems >= 2 {
            finding.score += 2;
            finding.note("Systems-focused approach, avoids blame");
        } else if blame > 0 {
            finding.note("Contains blame-focused language; consider systems approach");
        }
    } else {
        finding.note("Missing dedicated root cause analysis section");
    }

    if lower.contains("5 whys") || why_count >= 3 {
        finding.strength("Uses structured 5 Whys methodology");
    }
    if contains_any(lower, &["contributing", "immediate", "underlying"]) {
        finding.strength("Identifies multiple contributing factors");
    }
    if count_present(lower, &["process", "system", "automation", "design"]) >= 2 {
        finding.strength("Systems-focused approach, avoids blame");
    }

    if finding.score < 15 {
        if !lower.contains("root cause") {
            finding.gap("Missing dedicated root cause section");
        }
        if why_count < 2 {
            finding.gap("No evidence of structured RCA methodology (e.g., 5 Whys)");
        }
        if contains_any(lower, &["human error", "forgot", "mistake", "should have"]) {
            finding.gap("Contains blame-focused language instead of systems thinking");
        }
        if !contains_any(lower, &["contributing", "immediate"]) {
            finding.gap("Limited identification of contributing factors");
        }
    }
    finding
}

fn communication_clarity(doc: &Document<'_>) -> Finding {
    let mut finding = Finding::default();
    let lower = doc.lower.as_str();
    let length = doc.raw.chars().count();

    let sections = count_present(
        lower,
        &["summary", "timeline", "impact", "root cause", "action", "lesson"],
    );
    if sections >= 5 {
        finding.score += 4;
        finding.note("Well-structured document with clear sections");
    } else if sections >= 3 {
        finding.score += 2;
        finding.note("Adequate document structure");
    } else {
        finding.note("Poor document structure, missing key sections");
    }

    if SUMMARY_HEADING.is_match(doc.raw) {
        finding.score += 3;
        finding.note("Executive summary present");
    } else {
        finding.note("Missing executive summary");
    }

    let sentences = SENTENCE_BREAK.split(doc.raw).collect::<Vec<&str>>();
    let long_sentences = sentences
        .iter()
        .filter(|sentence| sentence.split_whitespace().count() > 30)
        .count();
    if (long_sentences as f64) < sentences.len() as f64 * 0.2 {
        finding.score += 2;
        finding.note("Good readability with appropriate sentence length");
    } else {
        finding.note("Some sentences are too long, affecting readability");
    }

    if (1000..=8000).contains(&length) {
        finding.score += 1;
        finding.note("Appropriate level of detail");
    } else if length < 1000 {
        finding.note("Document may be too brief");
    } else {
        finding.note("Document may be too verbose");
    }

    let standard = ["summary", "timeline", "impact", "cause", "action"];
    if count_present(lower, &standard) >= 4 {
        finding.strength("Well-structured with clear sections");
    }
    if lower.contains("summary") {
        finding.strength("Includes executive summary");
    }
    if (1000..=6000).contains(&length) {
        finding.strength("Appropriate level of detail");
    }

    if finding.score < 6 {
        if !lower.contains("summary") {
            finding.gap("Missing executive summary");
        }
        let absent = missing(lower, &["timeline", "impact", "cause", "action"]);
        if !absent.is_empty() {
            finding.gap(format!("Missing key sections: {}", absent.join(", ")));
        }
        if length < 500 {
            finding.gap("Document too brief, lacks sufficient detail");
        }
    }
    finding
}

fn action_items_prevention(doc: &Document<'_>) -> Finding {
    let mut finding = Finding::default();
    let lower = doc.lower.as_str();

    if contains_any(
        lower,
        &["action item", "next step", "remediation", "fix", "follow up", "todo"],
    ) {
        finding.score += 4;
        finding.note("Action items section present");

        let actionable: usize = ACTIONABLE
            .iter()
            .map(|pattern| pattern.find_iter(doc.raw).count())
            .sum();
        if actionable >= 5 {
            finding.score += 6;
            finding.note("Specific, actionable items with ownership");
        } else if actionable >= 2 {
            finding.score += 3;
            finding.note("Some actionable items present");
        } else {
            finding.note("Action items lack specificity or ownership");
        }

        let prevention = count_present(
            lower,
            &[
                "prevent", "avoid", "monitor", "alert", "automation", "process", "procedure",
                "documentation", "training", "review",
            ],
        );
        if prevention >= 4 {
            finding.score += 6;
            finding.note("Strong prevention focus in action items");
        } else if prevention >= 2 {
            finding.score += 3;
            finding.note("Some prevention-focused actions");
        } else {
            finding.note("Action items focus mainly on fixing, not prevention");
        }

        if contains_any(
            lower,
            &["priority", "critical", "high", "medium", "low", "risk", "important"],
        ) {
            finding.score += 2;
            finding.note("Action items show prioritization");
        } else {
            finding.note("Action items lack clear prioritization");
        }

        if contains_any(lower, &["deadline", "by", "within", "week", "month", "sprint"]) {
            finding.score += 2;
            finding.note("Timelines specified for actions");
        } else {
            finding.note("Missing timelines for action items");
        }
    } else {
        finding.note("Missing action items section");
    }

    if contains_any(lower, &["action", "remediation", "fix"]) {
        finding.strength("Includes action items section");
    }
    if contains_any(lower, &["prevent", "monitor", "automation"]) {
        finding.strength("Prevention-focused actions identified");
    }
    if contains_any(lower, &["owner", "assigned", "responsible"]) {
        finding.strength("Action items have clear ownership");
    }

    if finding.score < 12 {
        if !contains_any(lower, &["action", "remediation", "next"]) {
            finding.gap("Missing action items section");
        }
        if !contains_any(lower, &["prevent", "avoid", "monitor"]) {
            finding.gap("Actions focus on fixing rather than prevention");
        }
        if !contains_any(lower, &["owner", "deadline", "by"]) {
            finding.gap("Action items lack ownership or timelines");
        }
    }
    finding
}

fn process_adherence(doc: &Document<'_>) -> Finding {
    let mut finding = Finding::default();
    let lower = doc.lower.as_str();
    let standard = ["summary", "timeline", "impact", "cause", "action"];

    let present = count_present(lower, &standard) as u32;
    finding.score += (present * 2).min(8);
    if present >= 4 {
        finding.note("Follows structured RCA format");
    } else {
        finding.note(format!(
            "Missing key sections ({} sections missing)",
            standard.len() as u32 - present
        ));
    }

    if contains_any(
        lower,
        &["severity", "priority", "p1", "p2", "p3", "p4", "critical", "major", "minor"],
    ) {
        finding.score += 1;
        finding.note("Incident severity/priority classified");
    } else {
        finding.note("Missing incident severity classification");
    }

    if count_present(lower, &["author", "date", "reviewed", "approved"]) >= 2 {
        finding.score += 1;
        finding.note("Shows process completeness (author, dates, review)");
    } else {
        finding.note("Missing process completion indicators");
    }

    if present >= 4 {
        finding.strength("Follows structured RCA format");
    }
    if contains_any(lower, &["p1", "p2", "severity", "priority"]) {
        finding.strength("Includes incident classification");
    }

    if finding.score < 6 {
        let absent = missing(lower, &["timeline", "impact", "cause", "action"]);
        if !absent.is_empty() {
            finding.gap(format!("Missing standard sections: {}", absent.join(", ")));
        }
        if !contains_any(lower, &["severity", "priority"]) {
            finding.gap("Missing incident severity classification");
        }
    }
    finding
}

fn learning_knowledge_sharing(doc: &Document<'_>) -> Finding {
    let mut finding = Finding::default();
    let lower = doc.lower.as_str();

    if contains_any(lower, &["lesson", "learn", "takeaway", "insight"]) {
        finding.score += 2;
        finding.note("Lessons learned section present");
    } else {
        finding.note("Missing explicit lessons learned");
    }

    if contains_any(
        lower,
        &["team", "organization", "similar", "pattern", "trend", "future"],
    ) {
        finding.score += 2;
        finding.note("Shows broader organizational learning value");
    } else {
        finding.note("Limited broader learning insights");
    }

    if contains_any(
        lower,
        &["document", "share", "communicate", "training", "wiki", "runbook"],
    ) {
        finding.score += 1;
        finding.note("Includes knowledge transfer elements");
    } else {
        finding.note("Missing knowledge transfer considerations");
    }

    if contains_any(lower, &["lesson", "learn", "takeaway"]) {
        finding.strength("Includes lessons learned");
    }
    if contains_any(lower, &["team", "organization", "similar"]) {
        finding.strength("Shows broader organizational value");
    }

    if finding.score < 3 {
        if !contains_any(lower, &["lesson", "learn"]) {
            finding.gap("Missing lessons learned section");
        }
        if !contains_any(lower, &["team", "similar", "future"]) {
            finding.gap("Limited broader learning insights");
        }
    }
    finding
}
