//! BoardMesh rendezvous server entry point.
//!
//! Binds the rendezvous listener and runs until Ctrl-C.  The listen port
//! defaults to 4170 and can be overridden with the `BOARDMESH_PORT`
//! environment variable.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use board_rendezvous::server::run_server;

const DEFAULT_PORT: u16 = 4170;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = match std::env::var("BOARDMESH_PORT") {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid BOARDMESH_PORT value {raw:?}"))?,
        Err(_) => DEFAULT_PORT,
    };
    let bind_addr = format!("0.0.0.0:{port}")
        .parse()
        .context("invalid bind address")?;

    info!("BoardMesh rendezvous server starting");

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    run_server(bind_addr, running).await?;

    info!("BoardMesh rendezvous server stopped");
    Ok(())
}
