use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use super::{Pipeline, PipelineSettings, default_since, export_type, fetch_incidents};
use crate::cache::AssessmentCache;
use crate::cli::{OutputFormat, ReportArgs};
use crate::commands::{analysis_backend, confluence_client, jira_client};
use crate::config::load_policy;
use crate::report::output::{write_csv, write_json_rows};
use crate::report::summary::{SummaryContext, build_summary, report_run_id};
use crate::report::assemble;
use crate::scoring::QualityScorer;
use crate::sources::throttle::RateGate;
use crate::util::{ensure_directory, utc_compact_string, write_json_pretty};

const NO_BACKEND_ID: &str = "none";

pub fn run(args: ReportArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started = Instant::now();
    let run_id = report_run_id(started_ts);

    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }
    if args.recent == Some(0) {
        bail!("--recent must be at least 1");
    }
    if args.include_content && args.format != OutputFormat::Json {
        warn!("--include-content only applies to json rows; ignoring");
    }

    let policy = load_policy(args.policy_path.as_deref())?;
    let policy_checksum = policy.checksum()?;
    let since = args.since.unwrap_or_else(default_since);

    let gate = Arc::new(RateGate::new(&policy.rate_limit));
    let jira = jira_client(&args.atlassian, &policy, Arc::clone(&gate))?;
    let confluence = confluence_client(&args.atlassian, &policy, Arc::clone(&gate))?;
    let backend = analysis_backend(&args.analysis, Arc::clone(&gate))?;
    let cache = args
        .cache_db
        .as_deref()
        .map(AssessmentCache::open)
        .transpose()?;

    info!(
        run_id = %run_id,
        project = %policy.project,
        space = %policy.rca_space,
        since = %since,
        default_since = args.since.is_none(),
        backend = args.analysis.backend.as_str(),
        workers = args.workers,
        "report started"
    );

    let incidents = fetch_incidents(&jira, &policy.incident_query(since), args.recent)?;
    info!(incidents = incidents.len(), "incidents fetched");

    let scorer = backend
        .as_deref()
        .map(|backend| QualityScorer::new(backend, &policy.grading, policy.scorer_limits()));
    let linker_settings = policy.linker_settings();
    let pipeline = Pipeline {
        documents: &confluence,
        linker: &linker_settings,
        scorer: scorer.as_ref(),
        cache: cache.as_ref(),
        settings: PipelineSettings {
            workers: args.workers,
            deadline: args
                .batch_timeout_secs
                .map(|secs| started + Duration::from_secs(secs)),
            keep_content: args.include_content && args.format == OutputFormat::Json,
            policy_checksum: policy_checksum.clone(),
        },
    };
    let output = pipeline.run(&incidents)?;

    let rows = assemble(
        &policy.columns,
        &incidents,
        &output.links,
        &output.assessments,
        &output.outcomes,
    );

    ensure_directory(&args.output_dir)?;
    let stamp = utc_compact_string(started_ts);
    let rows_path = args.output_path.clone().unwrap_or_else(|| {
        args.output_dir.join(format!(
            "incident_report_{stamp}.{}",
            args.format.extension()
        ))
    });
    match args.format {
        OutputFormat::Csv => write_csv(&rows_path, &policy.columns, &rows)?,
        OutputFormat::Json => {
            write_json_rows(&rows_path, &policy.columns, &rows, args.include_content)?
        }
    }
    info!(path = %rows_path.display(), rows = rows.len(), "wrote report rows");

    let summary = build_summary(
        SummaryContext {
            run_id,
            policy_checksum,
            backend: scorer
                .as_ref()
                .map_or(NO_BACKEND_ID, |scorer| scorer.backend_id())
                .to_string(),
            export_type: export_type(args.since, args.recent),
            created_after: since,
            warnings: output.warnings.clone(),
        },
        &incidents,
        rows.len(),
        &output.links,
        &output.assessments,
        &output.outcomes,
    );
    let summary_path: PathBuf = args
        .output_dir
        .join(format!("report_summary_{stamp}.json"));
    write_json_pretty(&summary_path, &summary)?;
    info!(path = %summary_path.display(), "wrote report summary");

    summary.log();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "report completed"
    );
    Ok(())
}
