// Bingo Card Service - Web Server

use anyhow::{Context, Result};
use bingo_card::api::{router, AppState};
use bingo_card::{db, Config};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bingo-server", version, about = "Bingo card REST API")]
struct Args {
    /// SQLite database file (overrides BINGO_DATABASE)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Listen address (overrides BINGO_BIND)
    #[arg(long)]
    bind: Option<String>,

    /// Static asset directory (overrides BINGO_STATIC_DIR)
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(db) = args.db {
        config.database_path = db;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(dir) = args.static_dir {
        config.static_dir = dir;
    }

    let conn = db::open_database(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;

    let app = router(AppState::new(conn), &config.static_dir);

    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(
        "Bingo server v{} running on http://{} (static files from {:?})",
        bingo_card::VERSION,
        config.bind_addr,
        config.static_dir
    );

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
