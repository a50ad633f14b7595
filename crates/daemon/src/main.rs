use std::path::PathBuf;
use std::sync::Arc;

use clap::{Arg, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use router::DataRouter;
use scan_daemon::config;
use scan_daemon::server::{self, AppState};
use scan_daemon::sessions::SessionManager;
use terminal::{ExecutionTracker, PtyBackend, TerminalHost};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scan_daemon=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("scan server starting...");

    let matches = Command::new("scan_server")
        .about("Scan data distribution and terminal session server")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Path to the server config file"),
        )
        .get_matches();

    let config = config::load_or_default(
        matches.get_one::<String>("config").map(PathBuf::from),
    )?;

    // --- Centralized state ---
    let sessions = SessionManager::new(config.auth.tokens.clone());
    let tracker = Arc::new(ExecutionTracker::new());
    let backend = Arc::new(PtyBackend::new(config.terminal.shell.clone()));
    let host = TerminalHost::new(backend, tracker.clone(), sessions.clone());
    let data_router = DataRouter::new(sessions.clone());

    let state = AppState {
        sessions,
        router: data_router,
        terminal: host,
        tracker,
    };

    // --- Server task ---
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server_handle = tokio::spawn(server::run(state, config, shutdown_rx));

    // --- Graceful shutdown ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping services...");
    let _ = shutdown_tx.send(());
    server_handle.await??;

    tracing::info!("scan server stopped gracefully");
    Ok(())
}
