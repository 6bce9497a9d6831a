use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::service::SearchService;

/// Periodic index rebuild loop.
///
/// One rebuild attempt happens up front so searches have an index before the
/// first tick; a failure there is logged, not fatal, because the ticker (and
/// the invalidation bus) will try again. The ttl is the authoritative
/// freshness bound: even if every `db.updated` event is lost, the index lags
/// the database by at most one interval.
pub async fn run(search: Arc<SearchService>, ttl: Duration, mut shutdown: watch::Receiver<bool>) {
    match search.rebuild_index().await {
        Ok(()) => tracing::info!("initial index built"),
        Err(err) => tracing::error!("initial index build failed: {}", err),
    }

    let mut ticker = tokio::time::interval(ttl);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; consume it so the loop waits a
    // full interval after the initial build.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("stopping indexer");
                return;
            }
            _ = ticker.tick() => {
                match search.rebuild_index().await {
                    Ok(()) => tracing::info!("index rebuilt"),
                    Err(err) => tracing::error!("index rebuild failed: {}", err),
                }
            }
        }
    }
}
