use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use nlq_assistant::llm::LlmClient;
use nlq_assistant::{AppConfig, AskOutcome, DataAssistant, NlqError};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nlq-assistant")]
#[command(about = "Ask questions about a tabular dataset in natural language")]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset to query (default: the first configured one)
    #[arg(short, long)]
    dataset: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive multi-turn session
    Chat,
    /// Show extracted keywords and their column mapping
    Keywords { question: String },
    /// Ask a single question
    Ask { question: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    let dataset = match &args.dataset {
        Some(name) => config
            .datasets
            .iter()
            .find(|d| &d.name == name)
            .ok_or_else(|| anyhow!("unknown dataset: {}", name))?,
        None => config
            .datasets
            .first()
            .ok_or_else(|| anyhow!("no dataset configured"))?,
    };

    let llm = LlmClient::new(&config.llm)?;
    info!("Using model {} for dataset '{}'", llm.model(), dataset.name);
    let assistant = DataAssistant::from_config(dataset, &config, Arc::new(llm))
        .with_context(|| format!("failed to load dataset '{}'", dataset.name))?;

    match args.command {
        Command::Keywords { question } => {
            let report = assistant.analyze(&question)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Ask { question } => {
            let outcome = assistant.ask("cli", &question).await?;
            print_outcome(&outcome)?;
        }
        Command::Chat => chat(&assistant).await?,
    }

    Ok(())
}

async fn chat(assistant: &DataAssistant) -> Result<()> {
    println!("Dataset '{}' ({} columns). Empty line or Ctrl-D to quit.", assistant.name(), assistant.catalog().len());
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            break;
        }

        match assistant.ask("cli", message).await {
            Ok(outcome) => print_outcome(&outcome)?,
            Err(e @ NlqError::TooManyClarificationValues { .. }) => println!("{}", e.user_message()),
            Err(e) => println!("❌ {}", e.user_message()),
        }
    }
    Ok(())
}

fn print_outcome(outcome: &AskOutcome) -> Result<()> {
    match outcome {
        AskOutcome::Message { message } => println!("{}", message),
        AskOutcome::Clarification { clarification } => {
            println!("Which column did you mean? Answer with one value per line, comma-separated:");
            for line in clarification {
                println!("  {}", line);
            }
        }
        AskOutcome::Answer { answer } => println!("{}", serde_json::to_string_pretty(answer)?),
    }
    Ok(())
}
