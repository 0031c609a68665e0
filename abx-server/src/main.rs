//! abx-server - A/B test allocation and significance service
//!
//! Serves the experiment CRUD, traffic allocation, event recording and
//! results endpoints over JSON/HTTP against a SQLite store.

use abx_common::config;
use abx_common::db::init_database;
use abx_server::{build_router, AppState};
use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "abx-server", version, about = "A/B test allocation and significance service")]
struct Args {
    /// Data directory holding abx.db (overrides ABX_DATA_DIR and config file)
    #[arg(long)]
    data_dir: Option<String>,

    /// HTTP listen port (overrides ABX_PORT and config file)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting abx-server v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let data_dir = config::resolve_data_dir(args.data_dir.as_deref(), "ABX_DATA_DIR")?;
    let db_path = config::database_path(&data_dir)?;
    info!("Database path: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    let state = AppState::new(pool);
    let app = build_router(state);

    let port = config::resolve_port(args.port, "ABX_PORT");
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("abx-server listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;

    Ok(())
}
