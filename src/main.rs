//! Bet slip settlement service
//!
//! Serves slip creation, balances and statements over HTTP and settles
//! pending slips in the background against local result files.

use anyhow::{Context, Result};
use axum::{middleware, Router};
use betslip_backend::{
    api::create_router, config::EngineConfig, engine::BetEngine, middleware::request_logging,
    settlement::SettlementScheduler,
};
use clap::Parser;
use dotenv::dotenv;
use std::{path::Path, sync::Arc};
use tokio::{net::TcpListener, sync::watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "betslip")]
#[command(about = "Accumulator bet slips with an append-only ledger")]
struct Args {
    /// SQLite database path (overrides BETSLIP_DB_PATH)
    #[arg(long)]
    db: Option<String>,

    /// Listen address (overrides BETSLIP_BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Serve the API without the background settlement loop
    #[arg(long, default_value = "false")]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();
    let args = Args::parse();

    let mut config = EngineConfig::from_env();
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.no_scheduler {
        config.settlement_enabled = false;
    }

    info!("🚀 Bet slip engine starting");
    let engine = Arc::new(BetEngine::from_config(&config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.settlement_enabled {
        let scheduler = SettlementScheduler::new(engine.clone(), config.settlement_interval);
        Some(tokio::spawn(scheduler.run(shutdown_rx)))
    } else {
        warn!("⚠️  Settlement scheduler disabled, slips settle only on request");
        None
    };

    let app: Router = create_router(engine)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            warn!("Settlement scheduler ended abnormally: {}", e);
        }
    }

    info!("👋 Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "betslip_backend=debug,betslip=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // cwd + parents
    let _ = dotenv();

    // Also the crate dir, for runs with --manifest-path from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
