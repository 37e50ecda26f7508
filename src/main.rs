use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use tracing::{Instrument, info_span};
use tracing_subscriber::EnvFilter;

use pmind_cli::{Settings, SettingsArgs, chat_command, index_command, query_command};

const DEFAULT_LOG_FILTER: &str = "warn,pmind=info,pmind_core=info,pmind_ollama=info,pmind_rag=info,pmind_cli=info";

#[derive(Parser)]
#[command(name = "pmind")]
#[command(about = "Index local files and web pages, then answer questions grounded in them", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,

    /// Without a subcommand, start an interactive question loop
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, chunk and embed sources into the index
    Index {
        /// Files, directories or http(s) URLs
        #[arg(required = true, num_args = 1..)]
        sources: Vec<String>,
    },
    /// Answer one question from the index
    Query {
        /// The question to answer
        prompt: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let outcome = run(cli).instrument(info_span!("main")).await;
    if let Err(e) = outcome {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::resolve(&cli.settings)?;

    match cli.command {
        Some(Commands::Index { sources }) => {
            index_command(&settings, &sources).await?;
        }
        Some(Commands::Query { prompt }) => {
            query_command(&settings, &prompt).await?;
        }
        None => chat_command(&settings).await?,
    }
    Ok(())
}
