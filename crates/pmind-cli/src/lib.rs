//! Command-line interface for PromptMind

mod commands;
mod settings;
mod ui;


pub use commands::{chat_command, index_command, query_command};
pub use settings::{HASH_EMBEDDING_MODEL, Settings, SettingsArgs};
pub use ui::{display_banner, handle_input_with_history, print_help};

// Re-export core types
pub use pmind_core::{Error, Result};
