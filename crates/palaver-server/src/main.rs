//! # palaver-server
//!
//! A minimal line-protocol chat server:
//! - **registration** (`POST /connect`) handing out opaque user tokens
//! - a shared **default chat** plus two-party **private chats**
//! - **history polling** (`GET /chats`) with per-request message counts
//! - **rate limiting** on the default chat and **complaint-driven banning**
//!   applied by a periodic moderation loop
//!
//! All state is in memory behind a connection-limited store; a restart
//! starts from scratch.

mod config;
mod dispatch;
mod handlers;
mod moderation;
mod server;

use tracing::info;
use tracing_subscriber::EnvFilter;

use palaver_store::ChatStore;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,palaver_server=debug")),
        )
        .init();

    info!("Starting palaver server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let store = ChatStore::new(config.max_connections);

    let moderation_handle = moderation::spawn(store.clone(), config.clone());

    // An interrupt stops the scheduler outright; in-flight requests are not
    // drained.
    tokio::select! {
        result = server::serve(store, config) => {
            if let Err(err) = result {
                tracing::error!(%err, "server failed");
                return Err(err);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    moderation_handle.abort();
    Ok(())
}
