/// Periodic removal of expired refresh records and revocations for stores
/// that have no native expiry

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{RefreshTokenStore, RevocationStore};
use crate::clock::Clock;

/// One pass over both stores. Failures are logged and the next tick retries.
pub async fn sweep_once(
    refresh_tokens: &dyn RefreshTokenStore,
    revocations: &dyn RevocationStore,
    clock: &dyn Clock,
) -> (u64, u64) {
    let now = clock.now();

    let refresh_purged = match refresh_tokens.purge_expired(now).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to purge expired refresh tokens");
            0
        }
    };
    let revocations_purged = match revocations.purge_expired(now).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to purge expired revocations");
            0
        }
    };

    if refresh_purged > 0 || revocations_purged > 0 {
        tracing::info!(
            refresh_tokens = refresh_purged,
            revocations = revocations_purged,
            "Expired session records purged"
        );
    }
    (refresh_purged, revocations_purged)
}

pub fn spawn_sweeper(
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    revocations: Arc<dyn RevocationStore>,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sweep_once(refresh_tokens.as_ref(), revocations.as_ref(), clock.as_ref()).await;
        }
    })
}
