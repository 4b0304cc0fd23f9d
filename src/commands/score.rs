use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::ScoreArgs;
use crate::commands::analysis_backend;
use crate::config::load_policy;
use crate::normalize::{NormalizedContent, normalize_markup};
use crate::scoring::{QualityAssessment, QualityScorer};
use crate::sources::throttle::RateGate;
use crate::util::write_json_pretty;

#[derive(Debug, Serialize)]
struct ScoreOutput {
    input: String,
    content_chars: usize,
    fallback_used: bool,
    assessment: QualityAssessment,
}

pub fn run(args: ScoreArgs) -> Result<()> {
    let policy = load_policy(args.policy_path.as_deref())?;
    let gate = Arc::new(RateGate::new(&policy.rate_limit));
    let Some(backend) = analysis_backend(&args.analysis, gate)? else {
        bail!("score needs an analysis backend; --backend none is not allowed here");
    };

    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let NormalizedContent {
        text,
        fallback_used,
    } = normalize_markup(&raw);
    if fallback_used {
        warn!(input = %args.input.display(), "markup could not be stripped; scoring raw text");
    }

    let scorer = QualityScorer::new(backend.as_ref(), &policy.grading, policy.scorer_limits());
    let assessment = scorer.assess(&text);
    info!(
        backend = scorer.backend_id(),
        status = assessment.status.as_str(),
        score = ?assessment.aggregate,
        grade = ?assessment.grade,
        low_confidence = assessment.low_confidence,
        "assessment complete"
    );

    let output = ScoreOutput {
        input: args.input.display().to_string(),
        content_chars: text.chars().count(),
        fallback_used,
        assessment,
    };

    if let Some(path) = &args.output_path {
        write_json_pretty(path, &output)?;
        info!(path = %path.display(), "wrote assessment");
        return Ok(());
    }

    let mut stdout = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut stdout, &output)
        .context("failed to serialize assessment json output")?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
