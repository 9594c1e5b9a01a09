use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "bookline_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "bookline_operation_duration_seconds";

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "bookline_bookings_created_total";

/// Counter: bookings cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "bookline_bookings_cancelled_total";

/// Counter: bookings rescheduled.
pub const BOOKINGS_RESCHEDULED_TOTAL: &str = "bookline_bookings_rescheduled_total";

/// Counter: reservations lost to an existing hold.
pub const RESERVE_CONFLICTS_TOTAL: &str = "bookline_reserve_conflicts_total";

// ── USE metrics (cache utilization) ─────────────────────────────

/// Counter: cache reads served from the cache.
pub const CACHE_HITS_TOTAL: &str = "bookline_cache_hits_total";

/// Counter: cache reads that fell through to the store.
pub const CACHE_MISSES_TOTAL: &str = "bookline_cache_misses_total";

/// Counter: keys deleted by post-commit invalidation.
pub const CACHE_INVALIDATIONS_TOTAL: &str = "bookline_cache_invalidations_total";

/// Counter: swallowed cache failures (reads, writes, scans).
pub const CACHE_ERRORS_TOTAL: &str = "bookline_cache_errors_total";

/// Counter: expired entries dropped by the sweeper.
pub const CACHE_SWEEP_PURGED_TOTAL: &str = "bookline_cache_sweep_purged_total";

/// Histogram: sweep pass duration in seconds.
pub const CACHE_SWEEP_DURATION_SECONDS: &str = "bookline_cache_sweep_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Env-filtered stdout subscriber for embedders that don't bring their own.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}
