use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{Incident, Priority};

const REVENUE_KEYWORDS: &[&str] = &[
    "payment",
    "billing",
    "checkout",
    "subscription",
    "revenue",
    "transaction",
    "purchase",
    "order",
    "financial",
];

const CRITICAL_SERVICE_KEYWORDS: &[&str] = &[
    "login",
    "authentication",
    "auth",
    "signup",
    "registration",
    "core",
    "main",
    "primary",
    "essential",
    "critical",
];

const AUTOMATION_INDICATORS: &[(&str, u32)] = &[
    ("runbook", 1),
    ("manual process", 2),
    ("human intervention", 2),
    ("could be automated", 3),
    ("should automate", 3),
    ("repetitive", 2),
    ("toil", 3),
    ("script", 1),
    ("automation", 1),
];

const DEBT_INDICATORS: &[(&str, u32)] = &[
    ("legacy", 2),
    ("technical debt", 3),
    ("refactor", 2),
    ("architectural", 3),
    ("workaround", 2),
    ("hack", 3),
    ("quick fix", 1),
    ("temporary", 1),
    ("cleanup", 1),
];

const ARCHITECTURE_TERMS: &[&str] = &[
    "architecture",
    "design flaw",
    "structural",
    "foundational",
    "system design",
    "architectural debt",
];

static CUSTOMER_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:,\d+)*)\s+(?:users?|members?|customers?)").expect("valid customer regex")
});
static CUSTOMER_SHARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?%)\s+of\s+(?:users?|members?)").expect("valid share regex")
});
static WHOLE_BASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:all|entire)\s+(?:user\s+)?base").expect("valid user base regex")
});
static ACCOUNT_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:,\d+)*)\s+(?:accounts?|profiles?)").expect("valid account regex")
});

static HOURS_AND_MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*hours?\s*(\d+)?\s*min").expect("valid hours and minutes regex")
});
static HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*hours?").expect("valid hours regex"));
static MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:mins?|minutes?)").expect("valid minutes regex"));
static SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*seconds?").expect("valid seconds regex"));

const MINUTE_UNIT: &str = r"\s*(?:mins?|minutes?)";
const HOUR_UNIT: &str = r"\s*hours?";

fn compile_all(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid timing regex"))
        .collect()
}

static DETECTION_MINUTES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        format!(r"detected?\s+(?:after\s+)?(\d+){MINUTE_UNIT}"),
        format!(r"noticed?\s+(?:after\s+)?(\d+){MINUTE_UNIT}"),
        format!(r"discovered?\s+(?:after\s+)?(\d+){MINUTE_UNIT}"),
        format!(r"alert(?:ed)?\s+(?:after\s+)?(\d+){MINUTE_UNIT}"),
        format!(r"time\s+to\s+detect(?:ion)?:?\s+(\d+){MINUTE_UNIT}"),
        format!(r"mttr?\s*[-:]?\s*(\d+){MINUTE_UNIT}"),
    ])
});
static DETECTION_HOURS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        format!(r"detected?\s+(?:after\s+)?(\d+(?:\.\d+)?){HOUR_UNIT}"),
        format!(r"time\s+to\s+detect(?:ion)?:?\s+(\d+(?:\.\d+)?){HOUR_UNIT}"),
    ])
});
static RESOLUTION_MINUTES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        format!(r"resolved?\s+(?:after\s+)?(\d+){MINUTE_UNIT}"),
        format!(r"fixed?\s+(?:after\s+)?(\d+){MINUTE_UNIT}"),
        format!(r"time\s+to\s+fix:?\s+(\d+){MINUTE_UNIT}"),
        format!(r"time\s+to\s+resolv(?:e|ution):?\s+(\d+){MINUTE_UNIT}"),
        format!(r"took\s+(\d+){MINUTE_UNIT}\s+to\s+(?:fix|resolve)"),
        format!(r"resolution\s+time:?\s+(\d+){MINUTE_UNIT}"),
    ])
});
static RESOLUTION_HOURS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        format!(r"resolved?\s+(?:after\s+)?(\d+(?:\.\d+)?){HOUR_UNIT}"),
        format!(r"took\s+(\d+(?:\.\d+)?){HOUR_UNIT}\s+to\s+(?:fix|resolve)"),
        format!(r"time\s+to\s+resolv(?:e|ution):?\s+(\d+(?:\.\d+)?){HOUR_UNIT}"),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCauseCategory {
    CodeBug,
    Configuration,
    Infrastructure,
    Deployment,
    ExternalDependency,
    Capacity,
    ProcessFailure,
    MonitoringGap,
    Unknown,
}

impl RootCauseCategory {
    const CLASSIFIED: [(RootCauseCategory, &'static [&'static str]); 8] = [
        (
            Self::CodeBug,
            &[
                "bug", "error", "exception", "null pointer", "index out of bounds",
                "race condition", "memory leak", "logic error", "off by one",
            ],
        ),
        (
            Self::Configuration,
            &[
                "config", "setting", "parameter", "environment variable", "property",
                "misconfigured", "wrong setting", "configuration error",
            ],
        ),
        (
            Self::Infrastructure,
            &[
                "server", "hardware", "network", "database", "disk space", "memory", "cpu",
                "load balancer", "dns", "ssl", "certificate", "aws", "cloud",
            ],
        ),
        (
            Self::Deployment,
            &[
                "deploy", "release", "rollback", "version", "build", "pipeline", "ci/cd",
                "migration", "update", "upgrade",
            ],
        ),
        (
            Self::ExternalDependency,
            &[
                "third party", "external", "vendor", "api", "service", "upstream",
                "downstream", "integration", "webhook", "partner",
            ],
        ),
        (
            Self::Capacity,
            &[
                "capacity", "performance", "slow", "timeout", "overload", "scaling", "traffic",
                "load", "bottleneck", "latency", "throughput",
            ],
        ),
        (
            Self::ProcessFailure,
            &[
                "human error", "manual", "process", "procedure", "forgot", "missed",
                "training", "communication", "handoff",
            ],
        ),
        (
            Self::MonitoringGap,
            &[
                "monitoring", "alert", "detection", "observability", "logging", "metric",
                "dashboard", "notification", "no alert",
            ],
        ),
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::CodeBug => "Code Bug",
            Self::Configuration => "Configuration Error",
            Self::Infrastructure => "Infrastructure Failure",
            Self::Deployment => "Deployment Issue",
            Self::ExternalDependency => "External Dependency",
            Self::Capacity => "Capacity/Performance",
            Self::ProcessFailure => "Process/Human Error",
            Self::MonitoringGap => "Monitoring/Alerting Gap",
            Self::Unknown => "Unknown/Not Classified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechDebtLevel {
    High,
    Medium,
    Low,
    None,
}

impl TechDebtLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::High => "High - Major refactoring needed",
            Self::Medium => "Medium - Some improvements required",
            Self::Low => "Low - Minor cleanup needed",
            Self::None => "None - Well-architected solution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessImpact {
    pub impact_score: u32,
    pub customer_count_affected: String,
    pub revenue_impact_est: String,
    pub service_downtime_minutes: u32,
    pub severity_justification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicalProfile {
    pub root_cause_category: RootCauseCategory,
    pub detection_time_minutes: u32,
    pub resolution_time_minutes: u32,
    pub technical_debt_level: TechDebtLevel,
    pub automation_score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    pub business: BusinessImpact,
    pub technical: TechnicalProfile,
}

pub fn analyze(text: &str, incident: &Incident) -> Insights {
    let lower = text.to_lowercase();
    let combined = format!("{lower} {}", incident.title.to_lowercase());
    Insights {
        business: business_impact(&lower, &combined, incident.priority),
        technical: technical_profile(&lower),
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

pub fn business_impact(lower: &str, combined: &str, priority: Option<Priority>) -> BusinessImpact {
    let customers = customer_impact(combined);
    let downtime = downtime_minutes(lower);
    let revenue_critical = contains_any(combined, REVENUE_KEYWORDS);
    let critical_service = contains_any(combined, CRITICAL_SERVICE_KEYWORDS);

    let revenue = revenue_estimate(priority, revenue_critical, critical_service, downtime);
    let score = impact_score(priority, &customers, downtime, revenue_critical);
    let justification = severity_justification(score, priority, &customers, downtime);

    BusinessImpact {
        impact_score: score,
        customer_count_affected: customers,
        revenue_impact_est: revenue.to_string(),
        service_downtime_minutes: downtime,
        severity_justification: justification,
    }
}

fn customer_impact(combined: &str) -> String {
    if let Some(captures) = CUSTOMER_COUNT.captures(combined) {
        return format!("{} users", &captures[1]);
    }
    if let Some(captures) = CUSTOMER_SHARE.captures(combined) {
        return format!("{} of user base", &captures[1]);
    }
    if WHOLE_BASE.is_match(combined) {
        return "All users affected".to_string();
    }
    if let Some(captures) = ACCOUNT_COUNT.captures(combined) {
        return format!("{} users", &captures[1]);
    }

    if contains_any(combined, &["all users", "entire user base", "everyone"]) {
        "All users affected".to_string()
    } else if contains_any(combined, &["many users", "multiple users", "several"]) {
        "Multiple users affected (unquantified)".to_string()
    } else if contains_any(combined, &["some users", "few users", "limited"]) {
        "Limited users affected".to_string()
    } else {
        "User impact not specified".to_string()
    }
}

pub fn downtime_minutes(lower: &str) -> u32 {
    if let Some(captures) = HOURS_AND_MINUTES.captures(lower) {
        let hours = captures[1].parse::<u32>().unwrap_or(0);
        let minutes = captures
            .get(2)
            .and_then(|minutes| minutes.as_str().parse::<u32>().ok())
            .unwrap_or(0);
        return hours.saturating_mul(60).saturating_add(minutes);
    }
    if let Some(hours) = HOURS
        .captures(lower)
        .and_then(|captures| captures[1].parse::<f64>().ok())
    {
        return (hours * 60.0) as u32;
    }
    if let Some(minutes) = MINUTES
        .captures(lower)
        .and_then(|captures| captures[1].parse::<u32>().ok())
    {
        return minutes;
    }
    if let Some(seconds) = SECONDS
        .captures(lower)
        .and_then(|captures| captures[1].parse::<u32>().ok())
    {
        return (seconds / 60).max(1);
    }
    0
}

fn revenue_estimate(
    priority: Option<Priority>,
    revenue_critical: bool,
    critical_service: bool,
    downtime: u32,
) -> &'static str {
    match priority {
        Some(Priority::P1) if revenue_critical && downtime > 30 => {
            "High: $50K+ potential revenue impact"
        }
        Some(Priority::P1) if critical_service && downtime > 15 => {
            "Medium: $10K-50K potential impact"
        }
        Some(Priority::P1) => "Medium: $5K-25K potential impact",
        Some(Priority::P2) if revenue_critical => "Medium: $5K-25K potential impact",
        Some(Priority::P2) => "Low: $1K-10K potential impact",
        Some(Priority::P3) if revenue_critical => "Low: $1K-5K potential impact",
        Some(Priority::P3) => "Minimal: <$1K potential impact",
        Some(Priority::P4) | None => "Minimal: <$500 potential impact",
    }
}

fn impact_score(
    priority: Option<Priority>,
    customers: &str,
    downtime: u32,
    revenue_critical: bool,
) -> u32 {
    let mut score = 1;
    score += match priority {
        Some(Priority::P1) => 4,
        Some(Priority::P2) => 3,
        Some(Priority::P3) => 2,
        Some(Priority::P4) | None => 1,
    };

    let customers = customers.to_lowercase();
    if customers.contains("all users") {
        score += 3;
    } else if contains_any(&customers, &["%", "thousand", "k users"]) {
        score += 2;
    } else if contains_any(&customers, &["multiple", "several"]) {
        score += 1;
    }

    if downtime > 120 {
        score += 2;
    } else if downtime > 30 {
        score += 1;
    }

    if revenue_critical {
        score += 1;
    }
    score.min(10)
}

fn severity_justification(
    score: u32,
    priority: Option<Priority>,
    customers: &str,
    downtime: u32,
) -> String {
    let mut reasons = vec![
        match score {
            8.. => "Critical business impact",
            6..=7 => "Significant business impact",
            4..=5 => "Moderate business impact",
            _ => "Limited business impact",
        }
        .to_string(),
    ];

    if let Some(priority @ (Priority::P1 | Priority::P2)) = priority {
        reasons.push(format!("{priority} incident with high urgency"));
    }

    if customers.to_lowercase().contains("all users") {
        reasons.push("Complete service disruption".to_string());
    } else if contains_any(customers, &["%", "thousand", "k"]) {
        reasons.push("Large user base affected".to_string());
    }

    if downtime > 60 {
        reasons.push(format!("Extended downtime ({downtime} minutes)"));
    } else if downtime > 0 {
        reasons.push(format!("Service interruption ({downtime} minutes)"));
    }
    reasons.join("; ")
}

pub fn technical_profile(lower: &str) -> TechnicalProfile {
    TechnicalProfile {
        root_cause_category: classify_root_cause(lower),
        detection_time_minutes: first_duration(lower, &DETECTION_MINUTES, &DETECTION_HOURS),
        resolution_time_minutes: first_duration(lower, &RESOLUTION_MINUTES, &RESOLUTION_HOURS),
        technical_debt_level: debt_level(lower),
        automation_score: automation_score(lower),
    }
}

fn classify_root_cause(lower: &str) -> RootCauseCategory {
    let mut best = (RootCauseCategory::Unknown, 0usize);
    for (category, keywords) in RootCauseCategory::CLASSIFIED {
        let score = keywords
            .iter()
            .map(|keyword| lower.matches(keyword).count().min(3))
            .sum::<usize>();
        if score > best.1 {
            best = (category, score);
        }
    }
    best.0
}

fn first_duration(lower: &str, minute_patterns: &[Regex], hour_patterns: &[Regex]) -> u32 {
    let minutes = minute_patterns.iter().find_map(|pattern| {
        pattern
            .captures(lower)
            .and_then(|captures| captures[1].parse::<u32>().ok())
    });
    if let Some(minutes) = minutes {
        return minutes;
    }
    hour_patterns
        .iter()
        .find_map(|pattern| {
            pattern
                .captures(lower)
                .and_then(|captures| captures[1].parse::<f64>().ok())
        })
        .map(|hours| (hours * 60.0) as u32)
        .unwrap_or(0)
}

fn debt_level(lower: &str) -> TechDebtLevel {
    let weighted = DEBT_INDICATORS
        .iter()
        .map(|(indicator, weight)| lower.matches(indicator).count() as u32 * weight)
        .sum::<u32>();
    let architectural = ARCHITECTURE_TERMS
        .iter()
        .filter(|term| lower.contains(*term))
        .count() as u32
        * 3;

    match weighted + architectural {
        8.. => TechDebtLevel::High,
        4..=7 => TechDebtLevel::Medium,
        1..=3 => TechDebtLevel::Low,
        0 => TechDebtLevel::None,
    }
}

fn automation_score(lower: &str) -> u32 {
    let mut score = AUTOMATION_INDICATORS
        .iter()
        .filter(|(indicator, _)| lower.contains(indicator))
        .map(|(_, weight)| weight)
        .sum::<u32>();

    if lower.contains("manual") && lower.contains("process") {
        score += 2;
    }
    if lower.contains("human") && (lower.contains("error") || lower.contains("intervention")) {
        score += 2;
    }
    if contains_any(lower, &["runbook", "playbook", "procedure"]) {
        score += 1;
    }
    if contains_any(lower, &["repetitive", "recurring", "pattern"]) {
        score += 1;
    }
    if lower.contains("prevent") && lower.contains("automat") {
        score += 2;
    }
    score.min(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};

    use crate::model::IncidentStatus;

    fn incident(title: &str, priority: Option<Priority>) -> Incident {
        Incident {
            key: "IR-1".to_string(),
            title: title.to_string(),
            priority,
            description: String::new(),
            teams: Default::default(),
            created: Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap(),
            status: IncidentStatus::Closed,
            comments: Vec::new(),
        }
    }

    #[test]
    fn p1_checkout_outage_scores_critical() {
        let text = "Checkout was down for 2 hours 15 min. 12,000 users could not complete payment. \
                    Detected after 7 minutes by an alert. Resolved after 140 minutes.";
        let insights = analyze(text, &incident("Checkout failures", Some(Priority::P1)));

        assert_eq!(insights.business.customer_count_affected, "12,000 users");
        assert_eq!(insights.business.service_downtime_minutes, 135);
        assert_eq!(
            insights.business.revenue_impact_est,
            "High: $50K+ potential revenue impact"
        );
        assert_eq!(insights.business.impact_score, 8);
        assert_eq!(
            insights.business.severity_justification,
            "Critical business impact; P1 incident with high urgency; Extended downtime (135 minutes)"
        );
        assert_eq!(insights.technical.detection_time_minutes, 7);
        assert_eq!(insights.technical.resolution_time_minutes, 140);
    }

    #[test]
    fn downtime_prefers_most_specific_unit() {
        assert_eq!(downtime_minutes("outage lasted 1.5 hours"), 90);
        assert_eq!(downtime_minutes("recovered in 20 minutes"), 20);
        assert_eq!(downtime_minutes("a 30 second blip"), 1);
        assert_eq!(downtime_minutes("no duration recorded"), 0);
    }

    #[test]
    fn unknown_priority_uses_lowest_band() {
        let insights = analyze("Some users saw errors.", &incident("Errors", None));
        assert_eq!(insights.business.customer_count_affected, "Limited users affected");
        assert_eq!(
            insights.business.revenue_impact_est,
            "Minimal: <$500 potential impact"
        );
        assert_eq!(insights.business.impact_score, 2);
    }

    #[test]
    fn root_cause_category_follows_keyword_weight() {
        let profile = technical_profile(
            "a misconfigured setting: the config parameter was wrong. config drift again.",
        );
        assert_eq!(profile.root_cause_category, RootCauseCategory::Configuration);
        assert_eq!(
            technical_profile("nothing useful").root_cause_category,
            RootCauseCategory::Unknown
        );
    }

    #[test]
    fn debt_and_automation_are_bounded() {
        let profile = technical_profile(
            "legacy hack with a temporary workaround; the manual process needs a runbook and \
             could be automated to prevent toil. human intervention was required.",
        );
        assert_eq!(profile.technical_debt_level, TechDebtLevel::High);
        assert_eq!(profile.automation_score, 5);
        assert_eq!(technical_profile("clean fix").technical_debt_level, TechDebtLevel::None);
    }
}
