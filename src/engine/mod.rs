mod availability;
mod conflict;
mod error;
mod ledger;
mod lifecycle;
mod queries;

pub use availability::{free_windows_in, merge_overlapping, subtract_ranges};
pub use error::EngineError;
pub use ledger::{ProviderAvailability, SharedProviderSlots, SlotLedger};

pub(crate) use conflict::now_ms;

use std::sync::Arc;
use std::time::Instant;

use crate::cache::{CacheCoordinator, InMemoryCache};
use crate::config::EngineConfig;
use crate::observability;
use crate::store::{BookingStore, InMemoryBookingStore, PartyDirectory};
use crate::sweeper::run_sweeper;

/// Booking engine facade. Owns the store, the per-provider slot ledger and
/// the cache coordinator; every lifecycle and query operation hangs off this.
///
/// The ledger is the single authority on slot occupancy. Mutations go
/// ledger-first, then store, compensating the ledger when the store write
/// fails, so a live booking row never exists without its hold.
pub struct Engine {
    pub(super) store: Arc<dyn BookingStore>,
    pub(super) ledger: Arc<dyn ProviderAvailability>,
    pub(super) cache: CacheCoordinator,
}

impl Engine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        ledger: Arc<dyn ProviderAvailability>,
        cache: CacheCoordinator,
    ) -> Self {
        Self {
            store,
            ledger,
            cache,
        }
    }

    /// Fully in-process engine: map-backed store, fresh slot ledger and a
    /// local cache with the expiry sweeper running on the current runtime.
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self::build_in_memory(config, Arc::new(InMemoryBookingStore::new()))
    }

    /// Same as [`Engine::in_memory`], with a party directory wired in so
    /// detailed reads can join client, provider and service summaries.
    pub fn in_memory_with_directory(
        config: &EngineConfig,
        directory: Arc<dyn PartyDirectory>,
    ) -> Self {
        Self::build_in_memory(
            config,
            Arc::new(InMemoryBookingStore::with_directory(directory)),
        )
    }

    fn build_in_memory(config: &EngineConfig, store: Arc<InMemoryBookingStore>) -> Self {
        let backend = Arc::new(InMemoryCache::new());
        tokio::spawn(run_sweeper(backend.clone(), config.sweep_interval));
        Self {
            store,
            ledger: Arc::new(SlotLedger::new()),
            cache: CacheCoordinator::new(backend, config.cache_ttls),
        }
    }
}

/// Per-operation counter and latency sample, labeled by outcome.
pub(super) fn observe_op<T>(op: &'static str, start: Instant, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(observability::OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(observability::OPERATION_DURATION_SECONDS, "op" => op)
        .record(start.elapsed().as_secs_f64());
}
