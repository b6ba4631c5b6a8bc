use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use duckduckgo_client::DdgClient;
use mailtrace_common::{Config, ScoutSettings};
use mailtrace_scout::fetcher::HttpFetcher;
use mailtrace_scout::infra::RunLog;
use mailtrace_scout::io::{read_people, write_results};
use mailtrace_scout::memory::{MemoryPaths, MemoryStore};
use mailtrace_scout::oracle::OpenAiOracle;
use mailtrace_scout::resolver::Resolver;
use mailtrace_scout::runner::Runner;

#[derive(Parser)]
#[command(
    name = "mailtrace-scout",
    about = "Find personal email addresses for a list of people and affiliations"
)]
struct Cli {
    /// Two-column CSV (name, affiliation), no header
    #[arg(long, env = "MAILTRACE_INPUT", default_value = "list_of_names_and_affiliations.csv")]
    input: PathBuf,

    /// Result CSV (Name, Institution, E-Mail)
    #[arg(long, env = "MAILTRACE_OUTPUT", default_value = "emails_ai_agent.csv")]
    output: PathBuf,

    /// Optional TOML file with tunables; built-in defaults otherwise
    #[arg(long, env = "MAILTRACE_CONFIG")]
    config: Option<PathBuf>,

    /// Append-only JSONL step log
    #[arg(long, env = "MAILTRACE_RUNS_LOG", default_value = "runs.jsonl")]
    runs_log: PathBuf,

    #[arg(long, env = "MAILTRACE_MEMORY_DOMAINS", default_value = "memory_domains.json")]
    memory_domains: PathBuf,

    #[arg(long, env = "MAILTRACE_MEMORY_PATTERNS", default_value = "memory_patterns.json")]
    memory_patterns: PathBuf,

    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::from_default_env().add_directive("mailtrace=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Mailtrace scout starting...");

    // Load config
    let config = Config::from_env()?;
    config.log_redacted();
    let settings = match &cli.config {
        Some(path) => {
            info!(config = %path.display(), "Loading settings");
            ScoutSettings::load(path)?
        }
        None => ScoutSettings::default(),
    };

    let people = read_people(&cli.input)?;
    info!(count = people.len(), input = %cli.input.display(), "People loaded");

    // Capabilities
    let mut ai = OpenAi::new(&config.openai_api_key, &config.openai_model);
    if let Some(base_url) = &config.openai_base_url {
        ai = ai.with_base_url(base_url);
    }
    let oracle = Arc::new(OpenAiOracle::new(ai, settings.oracle.json_mode));
    let searcher = Arc::new(
        DdgClient::new(&settings.http.user_agent, settings.http.request_timeout())
            .context("Failed to build search client")?,
    );
    let fetcher = Arc::new(HttpFetcher::from_config(&settings.http)?);

    let mut memory = MemoryStore::load(MemoryPaths {
        domains: cli.memory_domains.clone(),
        patterns: cli.memory_patterns.clone(),
    })?;
    let mut log = RunLog::open(&cli.runs_log)?;

    let runner = Runner::new(Resolver::new(fetcher, searcher, oracle, settings));
    let (rows, stats) = runner.run(&people, &mut memory, &mut log).await;

    write_results(&cli.output, &rows)?;
    info!(output = %cli.output.display(), rows = rows.len(), "Results written");

    println!("{stats}");
    Ok(())
}
