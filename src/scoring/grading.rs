use std::collections::BTreeSet;
use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub const ALL: [Grade; 5] = [Grade::A, Grade::B, Grade::C, Grade::D, Grade::F];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }

    pub fn meaning(self) -> &'static str {
        match self {
            Self::A => "Exemplary RCA that should be used as a template",
            Self::B => "Good RCA with only minor improvements needed",
            Self::C => "Adequate RCA but missing several key elements",
            Self::D => "Poor RCA with significant gaps that undermine its value",
            Self::F => "Inadequate RCA that fails to meet basic standards",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GradeThreshold {
    pub grade: Grade,
    pub min_score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GradingPolicy {
    pub thresholds: Vec<GradeThreshold>,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            thresholds: [(Grade::A, 90), (Grade::B, 80), (Grade::C, 70), (Grade::D, 60), (Grade::F, 0)]
                .into_iter()
                .map(|(grade, min_score)| GradeThreshold { grade, min_score })
                .collect(),
        }
    }
}

impl GradingPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.thresholds.is_empty() {
            bail!("grading policy needs at least one threshold");
        }

        let mut seen = BTreeSet::new();
        for threshold in &self.thresholds {
            if threshold.min_score > 100 {
                bail!(
                    "grade {} threshold {} is above 100",
                    threshold.grade,
                    threshold.min_score
                );
            }
            if !seen.insert(threshold.grade) {
                bail!("grade {} appears more than once", threshold.grade);
            }
        }

        for pair in self.thresholds.windows(2) {
            let (better, worse) = (pair[0], pair[1]);
            if better.grade >= worse.grade {
                bail!(
                    "grades must be listed best first: {} before {}",
                    better.grade,
                    worse.grade
                );
            }
            if better.min_score <= worse.min_score {
                bail!(
                    "thresholds must strictly decrease: {} ({}) then {} ({})",
                    better.grade,
                    better.min_score,
                    worse.grade,
                    worse.min_score
                );
            }
        }
        Ok(())
    }

    pub fn grade_for(&self, score: u32) -> Grade {
        self.thresholds
            .iter()
            .find(|threshold| score >= threshold.min_score)
            .map(|threshold| threshold.grade)
            .unwrap_or(Grade::F)
    }

    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut upper = 100u32;
        for threshold in &self.thresholds {
            lines.push(format!(
                "{} ({}-{}): {}",
                threshold.grade,
                threshold.min_score,
                upper,
                threshold.grade.meaning()
            ));
            upper = threshold.min_score.saturating_sub(1);
        }
        let covers_zero = self
            .thresholds
            .last()
            .is_some_and(|threshold| threshold.min_score == 0);
        if !covers_zero {
            lines.push(format!("F (0-{}): {}", upper, Grade::F.meaning()));
        }
        lines
    }
}
