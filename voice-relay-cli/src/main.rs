//! CLI entry point for voice-relay

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use console::style;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use voice_relay_core::config::{Config, ConfigLoader};
use voice_relay_core::logging::init_logging;
use voice_relay_core::session::SessionStore;
use voice_relay_providers::{GeminiClient, GenerationParams};
use voice_relay_server::{run_server, spawn_session_sweeper, AppState, Dispatcher};

#[derive(Parser)]
#[command(name = "voice-relay")]
#[command(about = "Relay voice-assistant requests to Gemini with per-user conversation memory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP relay
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Send one utterance through the relay from the terminal
    Ask {
        /// User identifier whose session to continue
        #[arg(short, long, default_value = "cli")]
        user: String,
        /// What to say
        message: String,
    },
    /// Inspect and maintain stored sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Show configuration status
    Status,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List stored sessions
    List,
    /// Remove every expired session
    Purge,
    /// Remove the session of one user
    Clear {
        /// User identifier (raw, it is sanitized the same way as requests)
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    match cli.command {
        Commands::Serve { host, port } => run_serve(&config_loader, host, port).await?,
        Commands::Ask { user, message } => run_ask(&config_loader, &user, &message).await?,
        Commands::Sessions { command } => {
            let config = config_loader.load()?;
            let store = SessionStore::from_config(&config.sessions)?;
            match command {
                SessionCommands::List => run_sessions_list(&store)?,
                SessionCommands::Purge => {
                    let removed = store.purge_expired()?;
                    println!("Removed {} expired session(s)", removed);
                }
                SessionCommands::Clear { user } => {
                    if store.discard(&user)? {
                        println!("{}", style("Session cleared").green());
                    } else {
                        println!("No session stored for {}", user);
                    }
                }
            }
        }
        Commands::Status => run_status(&config_loader)?,
    }

    Ok(())
}

fn build_dispatcher(config: &Config) -> Result<Arc<Dispatcher>> {
    let store = Arc::new(SessionStore::from_config(&config.sessions)?);
    let model = Arc::new(GeminiClient::from_config(&config.model));
    Ok(Arc::new(Dispatcher::new(
        model,
        store,
        GenerationParams::from(&config.model),
    )))
}

async fn run_serve(loader: &ConfigLoader, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = loader.load()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let _log_guard = init_logging(&config.logging);

    if !config.model.has_api_key() {
        warn!("GEMINI_API_KEY is not set; every conversation turn will answer with an error");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let dispatcher = build_dispatcher(&config)?;
    info!(
        model = %config.model.model,
        idle_timeout_secs = config.sessions.idle_timeout_secs,
        "Relay configured"
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let sweeper = if config.sessions.sweep_interval_secs > 0 {
        Some(spawn_session_sweeper(
            Arc::clone(dispatcher.store()),
            Duration::from_secs(config.sessions.sweep_interval_secs),
            shutdown_tx.subscribe(),
        ))
    } else {
        None
    };

    let mut server = tokio::spawn(run_server(
        AppState::new(dispatcher),
        addr,
        shutdown_rx,
    ));

    println!(
        "{}",
        style(format!("Voice relay listening on http://{}", addr))
            .bold()
            .cyan()
    );
    println!("{}", style("Press Ctrl+C to stop.").green());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            println!("\n{}", style("Shutting down...").yellow());
            let _ = shutdown_tx.send(());
        }
        result = &mut server => {
            // The server stopped on its own, most likely a bind failure.
            result??;
            return Ok(());
        }
    }

    server.await??;
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }
    println!("{}", style("Relay stopped.").green());
    Ok(())
}

async fn run_ask(loader: &ConfigLoader, user: &str, message: &str) -> Result<()> {
    let config = loader.load()?;
    let _log_guard = init_logging(&config.logging);
    let dispatcher = build_dispatcher(&config)?;

    let reply = dispatcher.converse(user, message).await;
    println!("{}", reply);
    Ok(())
}

fn run_sessions_list(store: &SessionStore) -> Result<()> {
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("No stored sessions");
        return Ok(());
    }

    println!(
        "{}",
        style(format!(
            "{:<50}  {:>6}  {:<19}  {}",
            "KEY", "TURNS", "MODIFIED", "STATE"
        ))
        .bold()
    );
    for session in sessions {
        let turns = session
            .turns
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        let modified = session
            .modified
            .map(|t| {
                DateTime::<Local>::from(t)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_default();
        let state = match (session.turns, session.expired) {
            (None, _) => style("corrupt").red(),
            (_, true) => style("expired").yellow(),
            (_, false) => style("active").green(),
        };
        println!(
            "{:<50}  {:>6}  {:<19}  {}",
            session.key, turns, modified, state
        );
    }
    Ok(())
}

fn run_status(loader: &ConfigLoader) -> Result<()> {
    let config = loader.load()?;

    println!("{}", style("Voice Relay Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config directory: {}", loader.config_dir().display());
    println!(
        "  Listen address: {}:{}",
        config.server.host, config.server.port
    );
    println!();

    println!("{}", style("Model:").bold());
    println!("  Name: {}", config.model.model);
    println!(
        "  Temperature: {}, max output tokens: {}",
        config.model.temperature, config.model.max_output_tokens
    );
    let key_status = if config.model.has_api_key() {
        style("configured").green()
    } else {
        style("not configured (set GEMINI_API_KEY)").red()
    };
    println!("  API key: {}", key_status);
    println!();

    println!("{}", style("Sessions:").bold());
    println!("  Directory: {}", config.sessions.resolved_dir().display());
    println!("  Idle timeout: {}s", config.sessions.idle_timeout_secs);
    Ok(())
}
