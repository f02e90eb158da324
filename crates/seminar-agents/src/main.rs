use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use seminar_agents::config::EngineConfig;
use seminar_agents::model::{check_endpoint, OpenAiClient};
use seminar_agents::session::{DriverOutcome, SessionDriver};
use seminar_agents::store::{DiscussionStore, MemoryStore, PgStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a seminar over a case file, taking your turns on stdin.
    Run {
        /// Path to the case study text.
        case_file: PathBuf,

        /// TOML config overlaying the SEMINAR_* environment defaults.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Name the roster should use for you.
        #[arg(long)]
        name: Option<String>,
    },
    /// Check that the configured model endpoint is reachable.
    Check {
        /// TOML config overlaying the SEMINAR_* environment defaults.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            case_file,
            config,
            name,
        } => run(case_file, config, name).await,
        Command::Check { config } => check(config).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            EngineConfig::from_file(&path).context("Failed to load configuration file")
        }
        None => Ok(EngineConfig::default()),
    }
}

async fn check(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let api_key = (!config.endpoint.api_key.is_empty()).then_some(config.endpoint.api_key.as_str());
    if check_endpoint(&config.endpoint.base_url, api_key).await {
        println!("endpoint {} is reachable", config.endpoint.base_url);
        Ok(())
    } else {
        anyhow::bail!("endpoint {} is not reachable", config.endpoint.base_url)
    }
}

async fn run(case_file: PathBuf, config: Option<PathBuf>, name: Option<String>) -> Result<()> {
    let case_content = std::fs::read_to_string(&case_file)
        .with_context(|| format!("Failed to read case file {}", case_file.display()))?;
    let config = load_config(config)?;
    let human_name = name.unwrap_or_else(|| "You".to_string());

    let model = Arc::new(OpenAiClient::new(
        &config.endpoint.base_url,
        &config.endpoint.api_key,
        &config.endpoint.model,
    ));
    let store: Arc<dyn DiscussionStore> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => Arc::new(MemoryStore::new()),
    };

    info!(model = %config.endpoint.model, human_name, "Seminar starting");
    let driver = SessionDriver::new(config, model, store);

    let mut reply = driver.start_discussion(&case_content, &human_name).await?;
    let session_id = reply.session_id.clone();
    let mut shown_turns = 0;

    if let Some(state) = driver.session(&session_id).await {
        if let Some(intro) = &state.professor_introduction {
            println!("\n{intro}");
        }
    }

    loop {
        // Turns that arrived since the last prompt.
        if let Some(state) = driver.session(&session_id).await {
            for turn in &state.current_discussion[shown_turns..] {
                println!("\n{}: {}", turn.speaker, turn.message);
            }
            shown_turns = state.current_discussion.len();
        }
        if let Some(ack) = reply.acknowledgement.take() {
            println!("\n{ack}");
        }

        match reply.outcome {
            DriverOutcome::AwaitingHuman { prompt } => {
                println!("\n{prompt}");
                let text = read_reply()?;
                reply = driver.submit_human_response(&session_id, &text).await?;
            }
            DriverOutcome::Complete { summaries } => {
                println!("\nSeminar complete.");
                for (i, summary) in summaries.iter().enumerate() {
                    println!("\nTopic {}: {}", i + 1, summary.overall_summary);
                }
                return Ok(());
            }
        }
    }
}

fn read_reply() -> Result<String> {
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            anyhow::bail!("stdin closed while the seminar was waiting for your reply");
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
}
