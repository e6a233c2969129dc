//! BoardMesh peer application entry point.
//!
//! Wires together the synchronization engine, the session registry, the peer
//! listener, and the rendezvous link, then parks until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()           -- TOML config with per-field defaults
//!  └─ SyncEngine / SessionRegistry / DiscoveryAdapter / AppState
//!  └─ start services
//!       ├─ run_peer_listener   (Tokio task, accept loop)
//!       └─ DiscoveryAdapter    (Tokio task, rendezvous reconnect loop)
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use board_peer::application::sync::SyncEngine;
use board_peer::infrastructure::network::discovery::{DiscoveryAdapter, DiscoverySettings};
use board_peer::infrastructure::network::run_peer_listener;
use board_peer::infrastructure::network::session::SessionRegistry;
use board_peer::infrastructure::storage::config::load_config;
use board_peer::infrastructure::ui_bridge::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.peer.log_level.clone())),
        )
        .init();

    info!("BoardMesh peer starting");

    let self_addr = config
        .network
        .self_addr()
        .context("invalid advertised address in configuration")?;
    let rendezvous_addr = config
        .network
        .rendezvous_addr()
        .context("invalid rendezvous address in configuration")?;

    let engine = Arc::new(SyncEngine::new(self_addr.clone()));
    let registry = Arc::new(SessionRegistry::new(self_addr.clone()));
    let discovery = Arc::new(DiscoveryAdapter::new(
        DiscoverySettings {
            server: rendezvous_addr.clone(),
            reconnect_interval: config.network.reconnect_interval(),
            connect_timeout: config.network.connect_timeout(),
        },
        Arc::clone(&engine),
        Arc::clone(&registry),
    ));
    let app = AppState::new(
        Arc::clone(&engine),
        Arc::clone(&registry),
        Arc::clone(&discovery),
    );

    // Shutdown flag shared across all background services.
    let running = Arc::new(AtomicBool::new(true));

    // ── Peer listener ─────────────────────────────────────────────────────────
    let bind_addr = format!(
        "{}:{}",
        config.network.bind_address, config.network.peer_port
    )
    .parse()
    .context("invalid bind address in configuration")?;
    {
        let engine = Arc::clone(&engine);
        let registry = Arc::clone(&registry);
        let running = Arc::clone(&running);
        tokio::spawn(async move {
            if let Err(e) = run_peer_listener(bind_addr, engine, registry, running).await {
                error!("peer listener failed: {e}");
            }
        });
    }

    // ── Rendezvous link ───────────────────────────────────────────────────────
    Arc::clone(&discovery).start(Arc::clone(&running));
    info!("rendezvous server: {rendezvous_addr}");

    // ── Initial board ─────────────────────────────────────────────────────────
    if config.peer.create_initial_board {
        let name = format!(
            "board{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis()
        );
        match app.create_board(&name) {
            Ok(id) => info!("created initial board {id}"),
            Err(e) => error!("could not create initial board: {e}"),
        }
    }

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("BoardMesh peer {self_addr} ready.  Press Ctrl-C to exit.");

    loop {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }

    // Local teardown only: links close and boards drop without propagation.
    app.shutdown();
    info!("BoardMesh peer stopped");
    Ok(())
}
