use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{error, info};

use crate::cli::CheckArgs;
use crate::commands::{CONFLUENCE_SERVICE, JIRA_SERVICE, confluence_client, jira_client};
use crate::config::load_policy;
use crate::sources::throttle::RateGate;

pub fn run(args: CheckArgs) -> Result<()> {
    let policy = load_policy(args.policy_path.as_deref())?;
    let gate = Arc::new(RateGate::new(&policy.rate_limit));
    let jira = jira_client(&args.atlassian, &policy, Arc::clone(&gate))?;
    let confluence = confluence_client(&args.atlassian, &policy, gate)?;

    let mut failures = Vec::new();

    match jira.myself() {
        Ok(me) => info!(service = JIRA_SERVICE, user = %me.display_name, "connection ok"),
        Err(err) => {
            error!(service = JIRA_SERVICE, error = %err, "connection failed");
            failures.push(JIRA_SERVICE);
        }
    }

    match confluence.check_connection() {
        Ok(()) => info!(service = CONFLUENCE_SERVICE, "connection ok"),
        Err(err) => {
            error!(service = CONFLUENCE_SERVICE, error = %err, "connection failed");
            failures.push(CONFLUENCE_SERVICE);
        }
    }

    match confluence.space(&policy.rca_space) {
        Ok(space) => info!(space = %space.key, name = %space.name, "rca space accessible"),
        Err(err) => {
            error!(space = %policy.rca_space, error = %err, "rca space not accessible");
            failures.push("rca space");
        }
    }

    if !failures.is_empty() {
        bail!("connection check failed: {}", failures.join(", "));
    }
    info!("all connections ok");
    Ok(())
}
