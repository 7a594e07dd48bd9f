use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sopcheck_common::SyncConfig;
use sopcheck_core::{Connection, EventSink, Server, SessionBoard, SopCatalog};
use sopcheck_protocol::{ChecklistUpdate, OutboundEvent, SessionId};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "sopcheck")]
#[command(about = "Realtime SOP checklist client and dispatcher")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Dispatcher WebSocket URL (e.g., ws://127.0.0.1:5000/ws)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Session whose checklist to follow
    #[arg(long, global = true)]
    pub session_id: Option<String>,

    /// Path to a JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the session checklist and toggle steps interactively
    Watch,
    /// Send a single checkbox change and exit
    Toggle {
        /// Step to update
        step_id: String,
        /// Mark the step as not done instead
        #[arg(long)]
        unchecked: bool,
    },
    /// Run an in-memory dispatcher seeded from a catalog file
    Serve {
        /// JSON catalog of sessions and their SOP steps
        #[arg(long)]
        catalog: PathBuf,
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:5000")]
        bind: String,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SyncConfig::load(cli.config.as_deref()).await?;
    if let Some(url) = &cli.url {
        config.server_url = url.clone();
    }
    if let Some(id) = &cli.session_id {
        config.session_id = Some(SessionId::new(id.clone()));
    }

    let interactive = matches!(cli.command, None | Some(Commands::Watch));
    init_logging(cli.debug, config.log_path.as_deref(), interactive)?;

    match cli.command {
        None | Some(Commands::Watch) => {
            sopcheck_tui::run_checklist(&config).await?;
        }
        Some(Commands::Toggle { step_id, unchecked }) => {
            let session_id = config.require_session_id()?;
            send_toggle(&config.server_url, session_id, step_id, !unchecked).await?;
        }
        Some(Commands::Serve { catalog, bind }) => {
            serve(&catalog, &bind).await?;
        }
    }

    Ok(())
}

async fn send_toggle(url: &str, session_id: SessionId, step_id: String, checked: bool) -> Result<()> {
    let conn = Connection::connect(url)
        .await
        .with_context(|| format!("could not connect to {url}"))?;
    let update = ChecklistUpdate::now(session_id, step_id, checked);
    println!("{} {} -> {}", update.timestamp, update.step_id, update.checked);
    conn.sender.emit(OutboundEvent::ChecklistUpdate(update))?;
    conn.close().await;
    Ok(())
}

async fn serve(catalog: &Path, bind: &str) -> Result<()> {
    let catalog = SopCatalog::load_from_file(catalog)
        .await
        .with_context(|| format!("could not load catalog {}", catalog.display()))?;
    let board = SessionBoard::from_catalog(catalog);
    tracing::info!("loaded {} sessions", board.len());

    let server = Server::bind(bind, board).await?;
    println!("dispatcher listening on ws://{}/ws", server.local_addr()?);
    server.run().await?;
    Ok(())
}

/// Install the global subscriber. While the TUI owns the terminal, logs go to
/// `log_path` or nowhere.
fn init_logging(debug: bool, log_path: Option<&Path>, interactive: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match (log_path, interactive) {
        (Some(path), _) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("could not open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()?;
        }
        (None, false) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
        (None, true) => {}
    }
    Ok(())
}
