use super::grading::GradingPolicy;

pub const RUBRIC_VERSION: &str = "rca-rubric-v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RubricDimension {
    pub key: &'static str,
    pub label: &'static str,
    pub ceiling: u32,
    pub criteria: &'static [&'static str],
}

impl RubricDimension {
    pub fn by_key(key: &str) -> Option<&'static RubricDimension> {
        DIMENSIONS.iter().find(|dimension| dimension.key == key)
    }
}

pub const TIMELINE_DETECTION: &str = "timeline_detection";
pub const IMPACT_ASSESSMENT: &str = "impact_assessment";
pub const ROOT_CAUSE_ANALYSIS: &str = "root_cause_analysis";
pub const COMMUNICATION_CLARITY: &str = "communication_clarity";
pub const ACTION_ITEMS_PREVENTION: &str = "action_items_prevention";
pub const PROCESS_ADHERENCE: &str = "process_adherence";
pub const LEARNING_KNOWLEDGE_SHARING: &str = "learning_knowledge_sharing";

pub const DIMENSIONS: [RubricDimension; 7] = [
    RubricDimension {
        key: TIMELINE_DETECTION,
        label: "Timeline & Detection",
        ceiling: 15,
        criteria: &[
            "Clear, detailed incident timeline with timestamps",
            "Detection methods and monitoring effectiveness",
            "Response time efficiency and escalation",
            "Time-to-detection and time-to-resolution analysis",
        ],
    },
    RubricDimension {
        key: IMPACT_ASSESSMENT,
        label: "Impact Assessment",
        ceiling: 15,
        criteria: &[
            "Quantified user impact (numbers, percentages, duration)",
            "Business impact assessment (revenue, reputation, SLA)",
            "Affected systems and scope definition",
            "External stakeholder communication",
        ],
    },
    RubricDimension {
        key: ROOT_CAUSE_ANALYSIS,
        label: "Root Cause Analysis",
        ceiling: 25,
        criteria: &[
            "Depth of technical analysis beyond surface symptoms",
            "Use of structured methodologies (5 Whys, fishbone diagram, fault tree)",
            "Multiple contributing factors identified",
            "Technical accuracy and detail appropriateness",
            "Avoids blame, focuses on systems and processes",
        ],
    },
    RubricDimension {
        key: COMMUNICATION_CLARITY,
        label: "Communication & Clarity",
        ceiling: 10,
        criteria: &[
            "Document structure and organization",
            "Clarity for technical and non-technical audiences",
            "Executive summary quality",
            "Appropriate level of technical detail",
        ],
    },
    RubricDimension {
        key: ACTION_ITEMS_PREVENTION,
        label: "Action Items & Prevention",
        ceiling: 20,
        criteria: &[
            "Specific, actionable remediation items",
            "Clear ownership and timelines",
            "Prevention focus, not just fixing the immediate issue",
            "Follow-up tracking mechanism",
            "Risk-based prioritization",
        ],
    },
    RubricDimension {
        key: PROCESS_ADHERENCE,
        label: "Process Adherence",
        ceiling: 10,
        criteria: &[
            "Follows a structured incident response methodology",
            "Appropriate sections and completeness",
            "Evidence of collaborative investigation",
            "Proper categorization and severity assessment",
        ],
    },
    RubricDimension {
        key: LEARNING_KNOWLEDGE_SHARING,
        label: "Learning & Knowledge Sharing",
        ceiling: 5,
        criteria: &[
            "Extractable lessons for the broader organization",
            "Knowledge transfer value",
            "Pattern recognition from previous incidents",
            "Contribution to institutional learning",
        ],
    },
];

pub fn total_points() -> u32 {
    DIMENSIONS.iter().map(|dimension| dimension.ceiling).sum()
}

pub fn build_prompt(grading: &GradingPolicy) -> String {
    let mut prompt = String::from(
        "You are a senior site reliability engineer reviewing a root cause analysis \
         (RCA) document. Evaluate the document that follows against the rubric below \
         and answer with a single JSON object.\n\nEVALUATION CRITERIA (",
    );
    prompt.push_str(&format!("{} points total):\n", total_points()));

    for (index, dimension) in DIMENSIONS.iter().enumerate() {
        prompt.push_str(&format!(
            "\n{}. {} [{}] (0-{} points)\n",
            index + 1,
            dimension.label.to_uppercase(),
            dimension.key,
            dimension.ceiling
        ));
        for criterion in dimension.criteria {
            prompt.push_str(&format!("- {criterion}\n"));
        }
    }

    prompt.push_str("\nGRADING SCALE:\n");
    for line in grading.describe() {
        prompt.push_str(&format!("- {line}\n"));
    }

    prompt.push_str(
        "\nRESPONSE FORMAT (JSON only, no prose):\n\
         {\"dimensions\": {\"<key>\": {\"score\": <integer>, \"strengths\": [\"..\"], \
         \"gaps\": [\"..\"], \"feedback\": \"..\"}}, \"strengths\": [\"..\"], \
         \"gaps\": [\"..\"], \"feedback\": \"..\"}\n\
         Use every dimension key listed above. Scores are integers between 0 and the \
         dimension's point ceiling.\n",
    );
    prompt
}
