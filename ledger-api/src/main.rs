//! Ledger API server - pages and live streams of closed ledgers.

mod config;
mod ledger;
mod ledgers;
mod logging;
mod paging;
mod resource;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::load_config;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "ledger-api")]
#[command(about = "Serve ledger history as HAL JSON, raw XDR, or server-sent events")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Path to the TOML config file
    #[arg(long, default_value = "ledger-api.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    info!(config = %args.config.display(), base_url = config.base_url(), "starting ledger-api");

    let state = AppState::new(&config);
    ledger::seed(
        &state.store,
        config.ledger.seed_ledgers,
        Utc::now(),
        config.close_interval(),
    )
    .context("seed ledger history")?;
    let ingester = ledger::spawn_ingester(
        state.store.clone(),
        state.broker.clone(),
        config.close_interval(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    ingester.await.context("ingester task")?;
    info!("shut down");
    Ok(())
}

/// Resolve on Ctrl-C after closing history, so open streams wake and end.
async fn shutdown_signal(state: AppState) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    ledger::shutdown(&state.store, state.broker.as_ref());
}
