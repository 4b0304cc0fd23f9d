pub mod check;
pub mod rca_list;
pub mod report;
pub mod score;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::cli::{AtlassianArgs, BackendArgs, BackendKind};
use crate::config::RunPolicy;
use crate::scoring::backend::{RemoteBackendSettings, RemoteLlmBackend, TextAnalysis};
use crate::scoring::heuristic::HeuristicBackend;
use crate::sources::ServiceCredentials;
use crate::sources::confluence::ConfluenceClient;
use crate::sources::http::HttpTransport;
use crate::sources::jira::JiraClient;
use crate::sources::throttle::RateGate;

pub(crate) const JIRA_SERVICE: &str = "jira";
pub(crate) const CONFLUENCE_SERVICE: &str = "confluence";

pub(crate) fn jira_client(
    args: &AtlassianArgs,
    policy: &RunPolicy,
    gate: Arc<RateGate>,
) -> Result<JiraClient> {
    let transport = HttpTransport::new(
        JIRA_SERVICE,
        credentials(&args.jira_url, args),
        policy.retry,
        gate,
    )
    .context("failed to build jira transport")?;
    Ok(JiraClient::new(transport, policy.fields.clone()))
}

pub(crate) fn confluence_client(
    args: &AtlassianArgs,
    policy: &RunPolicy,
    gate: Arc<RateGate>,
) -> Result<ConfluenceClient> {
    let transport = HttpTransport::new(
        CONFLUENCE_SERVICE,
        credentials(&args.confluence_url, args),
        policy.retry,
        gate,
    )
    .context("failed to build confluence transport")?;
    Ok(ConfluenceClient::new(transport))
}

fn credentials(base_url: &str, args: &AtlassianArgs) -> ServiceCredentials {
    ServiceCredentials {
        base_url: base_url.trim_end_matches('/').to_string(),
        email: args.email.clone(),
        api_token: args.api_token.clone(),
    }
}

pub(crate) fn analysis_backend(
    args: &BackendArgs,
    gate: Arc<RateGate>,
) -> Result<Option<Box<dyn TextAnalysis>>> {
    match args.backend {
        BackendKind::None => Ok(None),
        BackendKind::Heuristic => Ok(Some(Box::new(HeuristicBackend))),
        BackendKind::Remote => {
            let Some(endpoint) = args.llm_endpoint.clone() else {
                bail!("--backend remote requires --llm-endpoint or RCA_LLM_ENDPOINT");
            };
            if args.llm_timeout_secs == 0 {
                bail!("--llm-timeout-secs must be at least 1");
            }
            let settings = RemoteBackendSettings {
                endpoint,
                model: args.llm_model.clone(),
                api_key: args.llm_api_key.clone(),
                timeout: Duration::from_secs(args.llm_timeout_secs),
            };
            let backend = RemoteLlmBackend::new(settings, gate)
                .context("failed to build remote analysis backend")?;
            Ok(Some(Box::new(backend)))
        }
    }
}
