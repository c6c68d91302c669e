mod lifecycle;

pub use lifecycle::*;

use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::auth::TokenService;

/// Spawn the background task that drops expired revocation entries
pub fn spawn_revocation_purge_task(tokens: Arc<TokenService>, interval_secs: u64) {
    if interval_secs == 0 {
        tracing::info!("Revocation purge is disabled");
        return;
    }

    tracing::info!(interval_secs, "Starting revocation purge task");

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            match tokens.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired revocations"),
                Err(e) => tracing::error!(error = %e, "Revocation purge failed"),
            }
        }
    });
}
