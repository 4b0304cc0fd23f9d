use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "incident-rca",
    version,
    about = "Link incidents to their RCA documents, grade the RCAs and report"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Report(ReportArgs),
    Check(CheckArgs),
    Score(ScoreArgs),
    RcaList(RcaListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AtlassianArgs {
    #[arg(long, env = "JIRA_URL")]
    pub jira_url: String,

    #[arg(long, env = "CONFLUENCE_URL")]
    pub confluence_url: String,

    #[arg(long, env = "ATLASSIAN_EMAIL")]
    pub email: String,

    #[arg(long, env = "ATLASSIAN_API_TOKEN", hide_env_values = true)]
    pub api_token: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum BackendKind {
    Heuristic,
    Remote,
    None,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Remote => "remote",
            Self::None => "none",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    #[arg(long, value_enum, default_value_t = BackendKind::Heuristic)]
    pub backend: BackendKind,

    #[arg(long, env = "RCA_LLM_ENDPOINT")]
    pub llm_endpoint: Option<String>,

    #[arg(long, env = "RCA_LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    #[arg(long, env = "RCA_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    #[arg(long, default_value_t = 120)]
    pub llm_timeout_secs: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub atlassian: AtlassianArgs,

    #[command(flatten)]
    pub analysis: BackendArgs,

    /// Creation lower bound (YYYY-MM-DD); defaults to 2024-01-01.
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Keep only the N most recently created incidents.
    #[arg(long)]
    pub recent: Option<usize>,

    #[arg(long)]
    pub policy_path: Option<PathBuf>,

    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    #[arg(long)]
    pub batch_timeout_secs: Option<u64>,

    #[arg(long)]
    pub cache_db: Option<PathBuf>,

    /// JSON rows also carry the normalized RCA text.
    #[arg(long, default_value_t = false)]
    pub include_content: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub atlassian: AtlassianArgs,

    #[arg(long)]
    pub policy_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    /// Storage-format markup or plain text of one RCA document.
    #[arg(long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub analysis: BackendArgs,

    #[arg(long)]
    pub policy_path: Option<PathBuf>,

    /// Write the assessment here instead of stdout.
    #[arg(long)]
    pub output_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RcaListArgs {
    #[command(flatten)]
    pub atlassian: AtlassianArgs,

    #[arg(long)]
    pub policy_path: Option<PathBuf>,

    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub output_path: Option<PathBuf>,
}
