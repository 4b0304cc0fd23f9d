use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::util::collapse_whitespace;

const DROPPED_ELEMENTS: &[&str] = &[
    "script",
    "style",
    "nav",
    "ac:image",
    "ri:attachment",
    "ac:placeholder",
    "ac:parameter",
];

const NAVIGATION_MACROS: &[&str] = &[
    "toc",
    "children",
    "pagetree",
    "breadcrumbs",
    "recently-updated",
    "attachments",
    "excerpt-include",
    "include",
];

static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

static CDATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid cdata regex"));

static DROPPED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DROPPED_ELEMENTS
        .iter()
        .map(|tag| {
            let tag = regex::escape(tag);
            Regex::new(&format!(r"(?is)<{tag}\b[^<>]*?(?:/>|>.*?</{tag}\s*>)"))
                .expect("valid dropped element regex")
        })
        .collect()
});

static NAVIGATION: LazyLock<Regex> = LazyLock::new(|| {
    let names = NAVIGATION_MACROS
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<String>>()
        .join("|");
    Regex::new(&format!(
        r#"(?is)<ac:structured-macro\b[^<>]*?ac:name="(?:{names})"[^<>]*?(?:/>|>.*?</ac:structured-macro\s*>)"#
    ))
    .expect("valid navigation macro regex")
});

static LIST_ITEM_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<li\b[^<>]*>").expect("valid list item regex"));

static BLOCK_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(?:p|div|br|h[1-6]|tr|table|tbody|thead|blockquote|pre|ul|ol|section|ac:rich-text-body|ac:plain-text-body|ac:task)\b[^<>]*>",
    )
    .expect("valid block tag regex")
});

static CELL_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</t[dh]\s*>").expect("valid table cell regex"));

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?[A-Za-z][A-Za-z0-9:_-]*(?:\s[^<>]*)?/?>").expect("valid tag regex")
});

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9A-Fa-f]{1,6}|#[0-9]{1,7}|[A-Za-z]{2,8});").expect("valid entity regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedContent {
    pub text: String,
    pub fallback_used: bool,
}

#[cfg(test)]
pub fn normalize(raw_markup: &str) -> String {
    normalize_markup(raw_markup).text
}

pub fn normalize_markup(raw_markup: &str) -> NormalizedContent {
    let text = tidy_lines(&decode_entities(&strip_markup(raw_markup)));
    if !text.is_empty() {
        return NormalizedContent {
            text,
            fallback_used: false,
        };
    }

    // Everything was classified as navigation or chrome. Keep the raw input
    // rather than report an empty document.
    let has_visible_text = !ANY_TAG.replace_all(raw_markup, "").trim().is_empty();
    if has_visible_text {
        NormalizedContent {
            text: collapse_whitespace(raw_markup),
            fallback_used: true,
        }
    } else {
        NormalizedContent {
            text: String::new(),
            fallback_used: false,
        }
    }
}

fn strip_markup(raw: &str) -> String {
    let mut text = CDATA
        .replace_all(raw, |captures: &Captures<'_>| {
            let body = captures[1]
                .replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;");
            format!("\n{body}\n")
        })
        .into_owned();
    text = COMMENTS.replace_all(&text, "").into_owned();
    text = NAVIGATION.replace_all(&text, "").into_owned();
    for pattern in DROPPED.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }
    text = LIST_ITEM_OPEN.replace_all(&text, "\n- ").into_owned();
    text = BLOCK_TAGS.replace_all(&text, "\n").into_owned();
    text = CELL_TAGS.replace_all(&text, " ").into_owned();
    ANY_TAG.replace_all(&text, "").into_owned()
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |captures: &Captures<'_>| {
            let entity = &captures[1];
            decode_entity(entity).unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

fn decode_entity(entity: &str) -> Option<String> {
    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        return u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from);
    }
    if let Some(decimal) = entity.strip_prefix('#') {
        return decimal
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(String::from);
    }

    let decoded = match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "ndash" => "-",
        "mdash" => "-",
        "lsquo" | "rsquo" => "'",
        "ldquo" | "rdquo" => "\"",
        "hellip" => "...",
        "bull" => "*",
        "rarr" => "->",
        _ => return None,
    };
    Some(decoded.to_string())
}

fn tidy_lines(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = true;
    for line in text.lines() {
        let line = collapse_whitespace(line);
        if line.is_empty() || line == "-" {
            if !previous_blank {
                lines.push(String::new());
            }
            previous_blank = true;
            continue;
        }
        lines.push(line);
        previous_blank = false;
    }
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<ac:structured-macro ac:name="toc" ac:schema-version="1"><ac:parameter ac:name="maxLevel">2</ac:parameter></ac:structured-macro>
<h1>Summary</h1><p>Members could not log in for <strong>45&nbsp;minutes</strong>.</p>
<!-- reviewer note -->
<ac:structured-macro ac:name="info"><ac:parameter ac:name="title">Heads up</ac:parameter><ac:rich-text-body><p>Impact was limited to iOS.</p></ac:rich-text-body></ac:structured-macro>
<h2>Action Items</h2><ul><li>Add alerting &amp; dashboards</li><li>Owner: <ac:link><ri:user ri:account-id="1"/></ac:link>SRE</li></ul>
<ac:image><ri:attachment ri:filename="graph.png"/></ac:image>
<ac:structured-macro ac:name="code"><ac:plain-text-body><![CDATA[if x < 3 { retry() }]]></ac:plain-text-body></ac:structured-macro>"#;

    #[test]
    fn strips_navigation_and_keeps_structure() {
        let text = normalize(SAMPLE);
        assert_eq!(
            text,
            "Summary\n\nMembers could not log in for 45 minutes.\n\nImpact was limited to iOS.\n\nAction Items\n\n- Add alerting & dashboards\n- Owner: SRE\n\nif x < 3 { retry() }"
        );
        assert!(!text.contains("maxLevel"));
        assert!(!text.contains("graph.png"));
        assert!(!text.contains("reviewer note"));
        assert!(!text.contains("Heads up"));
    }

    #[test]
    fn normalization_is_idempotent_on_same_input() {
        assert_eq!(normalize(SAMPLE), normalize(SAMPLE));
        let once = normalize(SAMPLE);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn unbalanced_angle_bracket_is_literal() {
        assert_eq!(
            normalize("<p>latency < 200ms after fix</p>"),
            "latency < 200ms after fix"
        );
        assert_eq!(normalize("a <b"), "a <b");
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        assert_eq!(
            normalize("Tom&#39;s &quot;fix&quot; &#x2192; &lt;ok&gt; &bogus;"),
            "Tom's \"fix\" \u{2192} <ok> &bogus;"
        );
    }

    #[test]
    fn falls_back_when_everything_is_chrome() {
        let content = normalize_markup("<nav>Incident Response / RCA Documents</nav>");
        assert!(content.fallback_used);
        assert_eq!(content.text, "<nav>Incident Response / RCA Documents</nav>");

        let empty = normalize_markup("<p>  </p>");
        assert!(!empty.fallback_used);
        assert!(empty.text.is_empty());
    }

    #[test]
    fn code_macro_bodies_keep_angle_brackets_and_entities() {
        let markup = r#"<ac:structured-macro ac:name="code"><ac:plain-text-body><![CDATA[let v: Vec<String> = load();
if a && b { print("&lt;") }]]></ac:plain-text-body></ac:structured-macro>"#;
        assert_eq!(
            normalize(markup),
            "let v: Vec<String> = load();\nif a && b { print(\"&lt;\") }"
        );
    }

    #[test]
    fn plain_text_passes_through() {
        let content = normalize_markup("Root cause:   expired\tcertificate\n\n\n\nFixed.");
        assert!(!content.fallback_used);
        assert_eq!(content.text, "Root cause: expired certificate\n\nFixed.");
    }
}
