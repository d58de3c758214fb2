//! ChatRelay - real-time chat relay for a tool-using AI agent
//!
//! Serves a WebSocket endpoint that relays chat turns between browser
//! clients and an agent backend.

use anyhow::Result;
use chatrelay::{
    agent::build_agent,
    config::{load_env_file, RelayConfig},
    server::ServerBuilder,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Real-time chat relay for a tool-using AI agent")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CHATRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Send one message to the agent and print the reply
    Ask {
        /// Message content
        message: String,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing so `.env` can also supply CHATRELAY_CONFIG
    let env_file = load_env_file(None);
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("chatrelay={},tower_http=debug", log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Some(path) = env_file? {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let config = RelayConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            run_server(config, host, port).await?;
        }
        Commands::Ask { message } => {
            ask(&config, &message).await?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn run_server(config: RelayConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut builder = ServerBuilder::new().config(config);
    if let Some(host) = host {
        builder = builder.host(host);
    }
    if let Some(port) = port {
        builder = builder.port(port);
    }
    let server = builder.build()?;

    server.start().await?;

    tracing::info!("ChatRelay is running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    server.stop().await?;

    Ok(())
}

async fn ask(config: &RelayConfig, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        anyhow::bail!("message must not be empty");
    }
    let agent = build_agent(&config.agent)?;
    let reply = agent.invoke(message.trim()).await?;
    println!("{}", reply);
    Ok(())
}

fn show_config(config: Option<&RelayConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", config.to_toml()?);
    Ok(())
}
