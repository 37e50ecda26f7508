//! `index`, `query` and interactive chat

use colored::*;
use tracing::{error, info};

use pmind_core::{IndexingReport, Result};
use pmind_rag::Answer;

use crate::Settings;
use crate::ui::{display_banner, handle_input_with_history, print_answer, print_help, print_report, print_settings};

const EXIT_WORDS: &[&str] = &["exit", "quit", "q"];

/// Index `sources` into the configured index path
pub async fn index_command(settings: &Settings, sources: &[String]) -> Result<IndexingReport> {
    print_settings(settings);
    let pipeline = settings.pipeline()?;

    println!("{} Indexing {} source(s)...", "→".blue(), sources.len());
    let report = pipeline.index_sources(sources).await?;
    print_report(&report);

    Ok(report)
}

/// Answer one question from the persisted index
pub async fn query_command(settings: &Settings, question: &str) -> Result<Answer> {
    print_settings(settings);
    let pipeline = settings.pipeline()?;

    let answer = pipeline.query(question).await?;
    print_answer(&answer);

    Ok(answer)
}

/// Read questions until the user leaves. Each turn is an independent
/// grounded query; failures are reported and the loop continues.
pub async fn chat_command(settings: &Settings) -> Result<()> {
    print_settings(settings);
    let pipeline = settings.pipeline()?;
    let session = pipeline.open().await?;
    info!(chunks = session.index().len(), "index loaded");

    display_banner(settings);
    let mut history = Vec::new();

    while let Some(input) = handle_input_with_history(&mut history).await? {
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let lowered = input.to_lowercase();
        if EXIT_WORDS.contains(&lowered.as_str()) {
            break;
        }
        if lowered == "help" {
            print_help();
            continue;
        }

        println!("{} Thinking...", "→".blue());
        match session.ask(input).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => {
                error!(error = %e, "question failed");
                println!("{} {}", "✗".red(), e);
            }
        }
        println!();
    }

    println!("{}", "Goodbye!".green());
    Ok(())
}
