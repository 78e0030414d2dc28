//! ragweave CLI, the main entry point.
//!
//! Commands:
//! - `ask`     Run one question through the pipeline
//! - `chat`    Interactive question loop
//! - `embed`   Embed the knowledge directory
//! - `status`  Show configuration and knowledge statistics
//! - `tools`   List the tools the model can call
//! - `serve`   Start the HTTP API

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ragweave",
    about = "ragweave: retrieval-augmented, tool-calling task orchestrator",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (defaults to ~/.ragweave/config.toml)
    #[arg(short, long, global = true, env = "RAGWEAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question (words are joined with spaces)
        #[arg(required = true)]
        question: Vec<String>,

        /// Print the full task report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask questions interactively
    Chat,

    /// Embed the knowledge directory into the vector store
    Embed {
        /// Re-embed every file, changed or not
        #[arg(short, long)]
        force: bool,

        /// Clear the collection and re-embed everything
        #[arg(long, conflicts_with = "force")]
        rebuild: bool,
    },

    /// Show configuration and knowledge statistics
    Status,

    /// List available tools
    Tools,

    /// Start the HTTP API server
    Serve {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Ask { question, json } => {
            commands::ask::run(config_path, &question.join(" "), json).await?
        }
        Commands::Chat => commands::chat::run(config_path).await?,
        Commands::Embed { force, rebuild } => {
            commands::embed::run(config_path, force, rebuild).await?
        }
        Commands::Status => commands::status::run(config_path).await?,
        Commands::Tools => commands::tools::run(config_path).await?,
        Commands::Serve { host, port } => commands::serve::run(config_path, host, port).await?,
    }

    Ok(())
}
