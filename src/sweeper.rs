use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::InMemoryCache;
use crate::observability;

/// Background task that periodically drops expired cache entries. Lazy
/// expiry on read handles hot keys; this pass reclaims the cold ones.
pub async fn run_sweeper(cache: Arc<InMemoryCache>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let start = std::time::Instant::now();
        let purged = cache.purge_expired();
        metrics::histogram!(observability::CACHE_SWEEP_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        if purged > 0 {
            metrics::counter!(observability::CACHE_SWEEP_PURGED_TOTAL).increment(purged as u64);
            debug!("swept {purged} expired cache entries");
        }
    }
}
