//! tally-daemon: HTTP service for the revenue-distribution pipeline.
//!
//! Single OS process running a Tokio runtime. Pipeline stages and claims are
//! blocking and run on the blocking pool against one shared SQLite
//! connection.

mod auth;
mod backends;
mod commands;
mod config;
mod events;
mod http;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::backends::{Backends, LiveBackends};
use crate::config::DaemonConfig;
use crate::events::EventBus;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Database connection.
    pub db: Arc<tokio::sync::Mutex<tally_db::rusqlite::Connection>>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// External service clients.
    pub backends: Arc<dyn Backends>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tally={}", config.logging.log_level).parse()?),
        )
        .init();

    info!("Tally daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open database
    let db_path = data_dir.join("tally.db");
    let conn = tally_db::open(&db_path)?;
    let db = Arc::new(tokio::sync::Mutex::new(conn));
    info!("Database opened at {:?}", db_path);

    // 3. Clients
    let keypair_path = Some(config.settlement.keypair_path.trim())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    if keypair_path.is_none() {
        warn!("settlement.keypair_path not set; claims will fail");
    }
    let backends = LiveBackends {
        fees: config.pumpfun(),
        solana: config.solana()?,
        keypair_path,
    };

    if !auth::ApiKeyConfig::new(&config.server.api_key).is_configured() {
        warn!("server.api_key not set; admin routes will refuse every request");
    }

    // 4. Event bus and audit log
    let event_bus = EventBus::new(1000);
    let audit = events::spawn_audit_log(&event_bus);

    let bind_addr = config.server.bind_addr.clone();
    let state = Arc::new(DaemonState {
        db,
        config,
        event_bus,
        backends: Arc::new(backends),
    });

    // 5. Serve until Ctrl-C
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP server listening on {}", bind_addr);

    axum::serve(listener, http::router(state.clone()))
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, shutting down"),
                Err(e) => {
                    warn!("failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    audit.abort();
    info!(events = state.event_bus.sequence(), "Daemon stopped");
    Ok(())
}
