//! Quarry CLI — the main entry point.
//!
//! Commands:
//! - `init`  — Write a config scaffold to ./quarry.toml
//! - `chat`  — Send a single message and print the outcome
//! - `serve` — Start the HTTP gateway

use clap::{Parser, Subcommand};
use quarry_core::message::SessionId;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Quarry — a workspace chat assistant over Bitbucket and Confluence",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a config file (defaults to ./quarry.toml, then ~/.quarry/quarry.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration scaffold to ./quarry.toml
    Init,

    /// Send a single message to the assistant
    Chat {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Session key; reusing one continues the conversation
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => init(),
        Commands::Chat { message, session } => chat(cli.config, message, session).await,
        Commands::Serve { port } => serve(cli.config, port).await,
    }
}

fn load_config(
    path: Option<PathBuf>,
) -> Result<quarry_config::AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => quarry_config::AppConfig::load_from(&p)?,
        None => quarry_config::AppConfig::load()?,
    };
    Ok(config)
}

fn init() -> Result<(), Box<dyn std::error::Error>> {
    let target = PathBuf::from("quarry.toml");
    if target.exists() {
        eprintln!("quarry.toml already exists — not overwriting");
        return Ok(());
    }
    std::fs::write(&target, quarry_config::AppConfig::default_toml())?;
    println!("Wrote {}", target.display());
    println!("Fill in your workspace, repository, and credentials to get started.");
    Ok(())
}

async fn chat(
    config_path: Option<PathBuf>,
    message: String,
    session: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let state = quarry_gateway::build_state(&config)?;

    let session = session
        .map(|s| SessionId::from(&s))
        .unwrap_or_default();

    let outcome = state.agent.invoke(&message, &session).await;

    if outcome.success {
        println!("{}", outcome.output.unwrap_or_default());
        tracing::debug!(session_id = %outcome.session_id, "Turn completed");
    } else {
        eprintln!(
            "error: {}",
            outcome.error.unwrap_or_else(|| "unknown".into())
        );
        std::process::exit(1);
    }

    Ok(())
}

async fn serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.gateway.port = port;
    }

    quarry_gateway::start(config).await
}
