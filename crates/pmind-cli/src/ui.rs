//! UI utilities for the CLI

use std::io::{self, IsTerminal, Write};

use colored::*;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, size},
};

use pmind_core::{IndexingReport, Result};
use pmind_rag::{Answer, Retrieval};

use crate::Settings;

const PROMPT: &str = "pmind>";

/// Display startup banner for the interactive mode
pub fn display_banner(settings: &Settings) {
    let terminal_width = size().map(|(w, _)| w as usize).unwrap_or(80);
    let banner_width = 60.min(terminal_width.saturating_sub(4)).max(30);

    let top_border = format!("┌{}┐", "─".repeat(banner_width - 2));
    let bottom_border = format!("└{}┘", "─".repeat(banner_width - 2));
    let empty_line = format!("│{}│", " ".repeat(banner_width - 2));
    let line = |text: &str| {
        let pad = banner_width.saturating_sub(text.chars().count() + 4);
        format!("│  {}{}│", text, " ".repeat(pad))
    };

    println!();
    println!("{}", top_border.blue());
    println!("{}", line("PromptMind - answers from your documents").blue().bold());
    println!("{}", empty_line.blue());
    println!("{}", line(&format!("index: {}", settings.index_path.display())).blue());
    println!("{}", line(&format!("model: {}", settings.llm_model)).blue());
    println!("{}", bottom_border.blue());
    println!();
    println!(
        "{}",
        "Tip: ask a question, 'help' for commands, 'exit' or Esc to leave".dimmed()
    );
    println!();
}

/// Read one line with ↑/↓ history. `None` means the user asked to leave
/// (Esc, Ctrl-C, Ctrl-D, or end of piped input).
pub async fn handle_input_with_history(history: &mut Vec<String>) -> Result<Option<String>> {
    if !io::stdin().is_terminal() {
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        let input = input.trim().to_string();
        if !input.is_empty() {
            history.push(input.clone());
        }
        return Ok(Some(input));
    }

    enable_raw_mode()?;
    let outcome = read_raw_line(history);
    disable_raw_mode()?;
    println!();

    let input = outcome?;
    if let Some(line) = &input {
        if !line.is_empty() {
            history.push(line.clone());
        }
    }
    Ok(input)
}

fn redraw(input: &str, previous_chars: usize) -> io::Result<()> {
    let clear = " ".repeat(previous_chars + 1);
    print!("\r{} {}\r{} {}", PROMPT.green().bold(), clear, PROMPT.green().bold(), input);
    io::stdout().flush()
}

fn read_raw_line(history: &[String]) -> Result<Option<String>> {
    let mut input = String::new();
    let mut history_index: Option<usize> = None;

    print!("{} ", PROMPT.green().bold());
    io::stdout().flush()?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }
        let previous = input.chars().count();

        match key_event.code {
            KeyCode::Enter => return Ok(Some(input)),
            KeyCode::Esc => return Ok(None),
            KeyCode::Char('c' | 'd') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(None);
            }
            KeyCode::Char(c) => {
                input.push(c);
                redraw(&input, previous)?;
            }
            KeyCode::Backspace => {
                if input.pop().is_some() {
                    redraw(&input, previous)?;
                }
            }
            KeyCode::Up if !history.is_empty() => {
                let new_index = match history_index {
                    None => history.len() - 1,
                    Some(idx) => idx.saturating_sub(1),
                };
                history_index = Some(new_index);
                input = history[new_index].clone();
                redraw(&input, previous)?;
            }
            KeyCode::Down => {
                if let Some(idx) = history_index {
                    if idx + 1 < history.len() {
                        history_index = Some(idx + 1);
                        input = history[idx + 1].clone();
                    } else {
                        history_index = None;
                        input.clear();
                    }
                    redraw(&input, previous)?;
                }
            }
            _ => {}
        }
    }
}

/// Display help message
pub fn print_help() {
    println!("{}", "Available commands:".bold());
    println!("  {} - Ask anything answered by the indexed documents", "<question>".green());
    println!("  {} - Show this help message", "help".green());
    println!("  {} - Leave (Esc and Ctrl-D work too)", "exit/quit/q".green());
    println!();
    println!("{}", "Examples:".bold());
    println!("  What is the capital of France?");
    println!("  Summarize the installation steps");
}

/// Print the resolved settings, as every command does on start-up
pub fn print_settings(settings: &Settings) {
    println!("{}", "Settings:".bold());
    println!("  {:<20} {}", "embedding model", settings.embedding_model.cyan());
    println!("  {:<20} {}", "llm model", settings.llm_model.cyan());
    println!("  {:<20} {}", "ollama url", settings.ollama_url);
    println!("  {:<20} {}", "chunk size", settings.chunk_size);
    println!("  {:<20} {}", "overlap", settings.overlap);
    match settings.embedding_dimensions {
        Some(d) => println!("  {:<20} {}", "dimensions", d),
        None => println!("  {:<20} {}", "dimensions", "probe".dimmed()),
    }
    println!("  {:<20} {}", "index path", settings.index_path.display());
    println!("  {:<20} {}", "top k", settings.top_k);
    println!("  {:<20} {}", "min relevance", settings.min_relevance);
    println!("  {:<20} {}", "embed concurrency", settings.embed_concurrency);
    println!();
}

pub fn print_report(report: &IndexingReport) {
    if report.documents == 0 {
        println!("{} No documents found", "⚠".yellow());
    }

    println!("{}", "Indexing report:".bold());
    println!("  {:<24} {}", "sources loaded", report.sources_loaded);
    println!("  {:<24} {}", "sources skipped", report.sources_skipped);
    if report.files_skipped > 0 {
        println!("  {:<24} {}", "files skipped", report.files_skipped.to_string().yellow());
    }
    println!("  {:<24} {}", "documents", report.documents);
    println!("  {:<24} {}", "empty documents dropped", report.empty_documents_dropped);
    println!("  {:<24} {}", "chunks indexed", report.chunks_indexed.to_string().green());
    if report.chunks_dropped > 0 {
        println!("  {:<24} {}", "chunks dropped", report.chunks_dropped.to_string().yellow());
    }
    for error in &report.errors {
        println!("  {} {}", "•".red(), error);
    }

    if report.persisted {
        println!("{} Index saved", "✓".green());
    } else {
        println!("{} Index left unchanged", "•".dimmed());
    }
}

pub fn print_sources(retrieval: &Retrieval) {
    if retrieval.sources.is_empty() {
        println!("{}", "No relevant fragments found".dimmed());
        return;
    }

    let sources: Vec<&str> = retrieval.sources.iter().map(String::as_str).collect();
    println!(
        "{} {} fragments from {}",
        "Retrieved".dimmed(),
        retrieval.results.len(),
        sources.join(", ").cyan()
    );
}

pub fn print_answer(answer: &Answer) {
    print_sources(&answer.retrieval);
    println!("{} {}", "Q:".bold(), answer.question);
    println!("{} {}", "A:".green().bold(), answer.text);
}
