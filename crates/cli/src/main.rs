//! Ember CLI: the main entry point.
//!
//! Commands:
//! - `memory` : Search, add and move session memories
//! - `prompt` : Preview the system prompt the governor would send
//! - `config` : Show, locate or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ember",
    about = "Ember — on-device agent governor, memory and context management",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Memory session to operate on (defaults to the configured one)
    #[arg(short, long, global = true, env = "EMBER_SESSION")]
    session: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the session memory store
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Print the system prompt for the built-in tools and learned memories
    Prompt {
        /// Chat template to wrap the prompt with (chatml or llama3)
        #[arg(short, long, default_value = "chatml")]
        template: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Search memories by text and/or tag
    Search {
        /// Text to look for
        query: Option<String>,
        /// Require this tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Store a fact
    Add {
        text: String,
        /// Tag the fact (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        #[arg(short, long, default_value_t = 0.5)]
        importance: f32,
        /// Keep the fact regardless of importance
        #[arg(long)]
        pin: bool,
    },
    /// Record a correction the agent must always follow
    Correct {
        statement: String,
        /// What the agent got wrong
        #[arg(short, long)]
        mistake: Option<String>,
    },
    /// Record an approach that worked
    Pattern { statement: String },
    /// Write every memory to a file
    Export {
        output: PathBuf,
        /// json or markdown
        #[arg(short, long, default_value = "json")]
        format: String,
    },
    /// Load memories from a JSON export
    Import { input: PathBuf },
    /// Move other sessions' logs into the archive directory
    Archive,
    /// Show store statistics
    Stats,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
    /// Validate the config file
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let session = cli.session.as_deref();
    match cli.command {
        Commands::Memory { action } => match action {
            MemoryAction::Search { query, tags, limit } => {
                commands::memory::search(session, query, tags, limit).await?
            }
            MemoryAction::Add {
                text,
                tags,
                importance,
                pin,
            } => commands::memory::add(session, &text, &tags, importance, pin).await?,
            MemoryAction::Correct { statement, mistake } => {
                commands::memory::correct(session, &statement, mistake.as_deref()).await?
            }
            MemoryAction::Pattern { statement } => commands::memory::pattern(session, &statement).await?,
            MemoryAction::Export { output, format } => {
                commands::memory::export(session, &output, &format).await?
            }
            MemoryAction::Import { input } => commands::memory::import(session, &input).await?,
            MemoryAction::Archive => commands::memory::archive(session).await?,
            MemoryAction::Stats => commands::memory::stats(session).await?,
        },
        Commands::Prompt { template } => commands::prompt::run(session, &template).await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
