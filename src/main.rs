mod cli;
mod gemini_client;
mod relay;

use std::env;
use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::topic::Topic;
use crate::cli::chat::{ChatContext, SessionOptions};
use crate::gemini_client::GeminiSettings;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Question to ask in the chat, then exit
    #[arg(short, long, global = true)]
    input: Option<String>,

    /// Gemini API key (defaults to GEMINI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Gemini model (defaults to GEMINI_MODEL or gemini-2.0-flash)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Topic used to bias every prompt
    #[arg(short, long, value_enum, default_value_t = Topic::General, global = true)]
    topic: Topic,

    /// Use the API key without sending a probe request first
    #[arg(long, global = true)]
    skip_validation: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat,
    /// Generate a quick report outline for a data analysis task
    Report {
        /// What the report is about, e.g. "Customer Churn Analysis"
        subject: Vec<String>,
    },
    /// Get best practices and optimization tips
    Practices {
        /// The area or task, e.g. "SQL query optimization"
        query: Vec<String>,
    },
    /// Get potential causes and fixes for an error
    Error {
        /// The error you are facing
        description: Vec<String>,
    },
}

impl Commands {
    /// The session input a one-shot subcommand stands for.
    fn as_input(&self) -> Option<String> {
        match self {
            Commands::Chat => None,
            Commands::Report { subject } => Some(format!("/report {}", subject.join(" "))),
            Commands::Practices { query } => Some(format!("/practices {}", query.join(" "))),
            Commands::Error { description } => Some(format!("/error {}", description.join(" "))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Data Analyst Assistant");

    let mut settings = GeminiSettings::from_env();
    if let Some(model) = cli.model {
        settings.model = model;
    }

    let api_key = cli
        .api_key
        .or_else(|| env::var("GEMINI_API_KEY").ok())
        .filter(|key| !key.trim().is_empty());

    let input = cli.command.as_ref().and_then(Commands::as_input).or(cli.input);

    let options = SessionOptions {
        topic: cli.topic,
        api_key,
        settings,
        skip_validation: cli.skip_validation,
    };

    let mut chat_context = ChatContext::new(Box::new(io::stdout()), input, true, options);
    chat_context.run().await
}
