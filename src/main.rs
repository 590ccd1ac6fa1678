//! Persona Agent - command line entry point
//!
//! Drives a single task through the pipeline against a console task handle
//! that prints the reply as it arrives.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use persona_agent::config::AgentConfig;
use persona_agent::llm::{LlmProvider, OpenAiProvider};
use persona_agent::observability::init_default_logging;
use persona_agent::processor::TaskProcessor;
use persona_agent::protocol::{Artifact, Message, TaskState};
use persona_agent::task::{ReportingError, TaskHandle};
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Persona-routing chat agent
#[derive(Parser)]
#[command(name = "persona-agent")]
#[command(about = "Routes a request to the XiaoMei or XiaoShuai persona and prints the reply")]
#[command(version)]
struct Cli {
    /// Configuration file path; falls back to agent.toml, then the environment
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one request
    Process {
        /// Request text
        #[arg(long)]
        text: String,

        /// Stream the reply chunk by chunk
        #[arg(long)]
        stream: bool,

        /// Task identifier; ids longer than 64 characters address a live voice session
        #[arg(long, env = "PERSONA_AGENT_TASK_ID")]
        task_id: Option<String>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env file: {e}");
        }
    }

    if let Err(e) = init_default_logging() {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!("Starting persona-agent v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Process {
            text,
            stream,
            task_id,
        } => run_task(config, text, stream, task_id).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&PathBuf>) -> Result<AgentConfig, Box<dyn std::error::Error>> {
    let path = config_path.cloned().or_else(AgentConfig::find_config_file);

    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(AgentConfig::load_from_file(&path)?)
        }
        None => {
            info!("No configuration file found, using environment");
            Ok(AgentConfig::from_env()?)
        }
    }
}

/// Build the pipeline from configuration
///
/// A missing API key is fatal here; voice settings problems only disable the
/// voice notifier.
fn build_processor(config: &AgentConfig) -> Result<TaskProcessor, Box<dyn std::error::Error>> {
    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(config.openai_config()?)?);
    let personas = config.persona_registry();

    let voice = config.voice_notifier(&personas);

    Ok(TaskProcessor::from_parts(
        provider,
        config.llm.model.as_str(),
        personas,
        voice,
    ))
}

async fn run_task(
    config: AgentConfig,
    text: String,
    stream: bool,
    task_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let processor = build_processor(&config)?;
    let task_id = task_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let handle = ConsoleTaskHandle { streaming: stream };

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone())?;

    info!(task_id = %task_id, model = %config.llm.model, streaming = stream, "Running task");

    processor
        .process(&task_id, &Message::user_text(text), &handle, &cancel)
        .await?;

    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
fn spawn_signal_handler(token: CancellationToken) -> std::io::Result<()> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, canceling task..."),
            _ = sigterm.recv() => info!("Received SIGTERM, canceling task..."),
        }
        token.cancel();
    });

    Ok(())
}

fn handle_config_command(config: &AgentConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Task handle printing the reply to stdout
///
/// Streamed chunks are written as they arrive; progress messages go to the log.
struct ConsoleTaskHandle {
    streaming: bool,
}

#[async_trait]
impl TaskHandle for ConsoleTaskHandle {
    fn is_streaming_request(&self) -> bool {
        self.streaming
    }

    async fn update_status(&self, state: TaskState, message: Option<Message>) -> Result<(), ReportingError> {
        let text = message.as_ref().and_then(Message::first_text).unwrap_or_default();

        match state {
            // Working updates during a stream repeat the chunk text.
            TaskState::Working => debug!(state = %state, message = %text, "Task status"),
            TaskState::Failed => warn!(state = %state, message = %text, "Task status"),
            _ => info!(state = %state, message = %text, "Task status"),
        }

        if state.is_terminal() && self.streaming {
            println!();
        }
        Ok(())
    }

    async fn add_artifact(&self, artifact: Artifact) -> Result<(), ReportingError> {
        let mut stdout = std::io::stdout().lock();
        let written = if self.streaming {
            write!(stdout, "{}", artifact.text())
        } else {
            writeln!(stdout, "{}", artifact.text())
        };

        written
            .and_then(|_| stdout.flush())
            .map_err(|e| ReportingError::Unavailable(format!("stdout: {e}")))
    }
}
