//! Overseer CLI
//!
//! A command-line tool for checking daemon health, reading system reports,
//! publishing telemetry events, and submitting tasks to the resource pool.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{actions, ops, report, status};

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Overseer CLI
#[derive(Parser)]
#[command(name = "overseer")]
#[command(author, version, about = "CLI for the Overseer orchestration daemon", long_about = None)]
pub struct Cli {
    /// API endpoint URL (falls back to the config file, then http://localhost:8080)
    #[arg(long, env = "OVERSEER_API_URL")]
    pub api_url: Option<String>,

    /// Output format (falls back to the config file, then table)
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show daemon health and readiness
    Status,

    /// Show the aggregated system report
    Report,

    /// List recent mitigation actions issued by the controller
    Actions {
        /// Maximum number of actions to show (newest first)
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Publish a telemetry event to a topic
    Publish {
        /// Topic to publish on (e.g. telemetry, operations)
        topic: String,

        /// Event payload as JSON
        #[arg(long, default_value = "{}")]
        payload: String,
    },

    /// Submit a task and wait for its result
    Submit {
        /// Task kind (e.g. optimization, prediction, generic)
        kind: String,

        /// Task parameters as JSON
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = config::Config::load().unwrap_or_else(|err| {
        eprintln!("Ignoring config file: {:#}", err);
        config::Config::default()
    });

    let api_url = cli
        .api_url
        .or(file_config.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let format = cli
        .format
        .or_else(|| file_config.output_format())
        .unwrap_or_default();

    if cli.verbose {
        eprintln!("Using API at {}", api_url);
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Status => {
            status::show_status(&client, format).await?;
        }
        Commands::Report => {
            report::show_report(&client, format).await?;
        }
        Commands::Actions { limit } => {
            actions::list_actions(&client, limit, format).await?;
        }
        Commands::Publish { topic, payload } => {
            ops::publish_event(&client, &topic, &payload, format).await?;
        }
        Commands::Submit { kind, params } => {
            ops::submit_task(&client, &kind, &params, format).await?;
        }
    }

    Ok(())
}
