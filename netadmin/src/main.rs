//! netadmin — HTTP service for iptables rules and the routing table
//!
//! Loads configuration, reads the current rules and routes from the host,
//! and serves the management API and web UI.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use netadmin::api::{self, AppState, RouterOptions};
use netadmin::auth::SessionRegistry;
use netadmin::config;
use netadmin::exec::SystemExecutor;
use netadmin::persist::PersistenceBridge;
use netadmin::store::{StateStore, ToolPaths};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.system.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .compact()
        .init();

    info!("netadmin starting...");

    let store = Arc::new(StateStore::new(
        Arc::new(SystemExecutor),
        ToolPaths::from(&config.system),
        PersistenceBridge::new(config.persistence.firewall_targets.clone()),
        PersistenceBridge::new(config.persistence.route_targets.clone()),
    ));

    let rules = store.reload_rules().await;
    let routes = store.reload_routes().await;
    info!("Loaded {rules} firewall rules and {routes} routes");

    let sessions = SessionRegistry::new(&config.auth).context("Invalid [auth] configuration")?;
    let state = Arc::new(AppState {
        store,
        sessions: Arc::new(sessions),
    });

    let options = RouterOptions {
        require_auth: config.auth.require_auth,
        frontend_dir: Some(config.server.frontend_path()?),
    };
    if !options.require_auth {
        tracing::warn!("Authentication is disabled; the API is open to anyone who can reach it");
    }

    let app = api::router(state, &options);

    let addr = config.server.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("netadmin listening on http://{addr}");

    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
