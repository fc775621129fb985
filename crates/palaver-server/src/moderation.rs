//! The moderation loop: a background task that promotes unreviewed
//! complaints into bans and lifts bans whose period has elapsed.
//!
//! Unbanning is lazy: a ban is only re-examined at the next cycle boundary,
//! never when the banned user acts.

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use palaver_store::ChatStore;

use crate::config::ServerConfig;

/// Spawn the moderation loop. Runs until the process exits.
pub fn spawn(store: ChatStore, config: ServerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.moderation_cycle());
        loop {
            interval.tick().await;
            if let Err(err) = run_cycle(&store, &config).await {
                error!(%err, "moderation cycle failed");
            }
        }
    })
}

/// One moderation cycle: review pending complaints, then expire bans.
///
/// Acquires its own cursor, so a cycle competes for admission with request
/// handlers like any other accessor.
pub async fn run_cycle(store: &ChatStore, config: &ServerConfig) -> palaver_store::Result<()> {
    let cursor = store.connect().await;
    let now = Utc::now();

    let reviewed = cursor
        .review_pending_complaints(config.max_complaint_count, now)
        .await;
    let expired = cursor.expire_bans(config.ban_period(), now).await;
    cursor.disconnect().await;

    let (reviewed, expired) = (reviewed?, expired?);
    if reviewed > 0 || expired > 0 {
        info!(reviewed, expired, "moderation cycle");
    }
    Ok(())
}
