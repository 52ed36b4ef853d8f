//! # pushnode-server
//!
//! Self-hosted push relay node.
//!
//! This binary provides:
//! - **Registration** of users and their devices, authenticated by P-256
//!   signatures over each request body
//! - **Sender endpoints** that verify a capability token and deliver the
//!   message, either straight to APNs or through an upstream relay
//! - A **signed node info document** clients pin before registering

mod api;
mod config;
mod dispatcher;
mod error;
mod node;
mod params;
mod pusher;
mod registrar;
mod upstream;

use std::sync::Arc;

use anyhow::Context;
use pushnode_store::{Database, NodeStore, SecretStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::{ServerConfig, StoreKind};
use crate::dispatcher::{PushClients, RelayDispatcher};
use crate::node::Node;
use crate::pusher::{ApnsAuth, ApnsPusher, APNS_PRODUCTION_URL, APNS_SANDBOX_URL};
use crate::registrar::Registrar;
use crate::upstream::Upstream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pushnode_server=debug")),
        )
        .init();

    info!("Starting pushnode v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store and load the node key
    // -----------------------------------------------------------------------
    let store: Arc<dyn NodeStore> = match config.store_kind() {
        Some(StoreKind::Sqlite(path)) => {
            info!(path = %path.display(), "Using SQLite store");
            Arc::new(Database::open_at(&path).context("open database")?)
        }
        Some(StoreKind::Serverless) => {
            let passphrase = config.secret.as_deref().unwrap_or_default();
            info!("No database configured; running serverless");
            Arc::new(SecretStore::new(passphrase.as_bytes()))
        }
        None => anyhow::bail!("set DB_PATH, DATA_PATH or NODE_SECRET"),
    };

    let node_key = node::load_node_key(config.secret.as_deref(), store.as_ref())?;
    let node = Arc::new(Node::new(
        node_key,
        &config.name,
        &config.endpoint,
        node::features(config.registerable, store.stores_devices()),
    ));
    info!(node_id = %node.id(), endpoint = %config.endpoint, "Node identity ready");

    // -----------------------------------------------------------------------
    // 4. Push and forward clients
    // -----------------------------------------------------------------------
    let pushers = match &config.apns {
        Some(apns) => {
            let pem = tokio::fs::read_to_string(&apns.key_path)
                .await
                .with_context(|| format!("read APNs key {}", apns.key_path.display()))?;
            let auth = Arc::new(ApnsAuth::from_pem(&pem, &apns.key_id, &apns.team_id)?);
            info!(key_id = %apns.key_id, topic = %apns.topic, "APNs delivery enabled");
            Some(PushClients {
                production: Arc::new(ApnsPusher::new(
                    APNS_PRODUCTION_URL,
                    auth.clone(),
                    config.http_timeout,
                )?),
                sandbox: Arc::new(ApnsPusher::new(APNS_SANDBOX_URL, auth, config.http_timeout)?),
                topic: apns.topic.clone(),
            })
        }
        None => {
            warn!("APNs not configured; bound devices cannot be reached");
            None
        }
    };

    let upstream = match &config.upstream_endpoint {
        Some(endpoint) => {
            info!(%endpoint, "Forwarding serverless users upstream");
            Some(Upstream::new(endpoint, config.http_timeout)?)
        }
        None => None,
    };

    let dispatcher = Arc::new(RelayDispatcher::new(
        node.id().to_string(),
        store.clone(),
        pushers,
        upstream,
    ));
    let registrar = Arc::new(Registrar::new(
        store.clone(),
        config.registerable,
        config.whitelist.clone(),
    ));

    let http_addr = config.http_addr;
    let app_state = AppState {
        node,
        store,
        registrar,
        dispatcher,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
