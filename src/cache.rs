use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::engine::now_ms;
use crate::model::*;
use crate::observability;

#[derive(Debug)]
pub struct CacheError(pub String);

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cache backend: {}", self.0)
    }
}

impl std::error::Error for CacheError {}

/// Byte-oriented cache boundary. Pattern queries are terminal-`*` prefixes
/// only, which every realistic backend (and the map below) can serve.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;
    async fn del(&self, keys: &[String]) -> Result<(), CacheError>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;
}

struct CacheEntry {
    value: Bytes,
    expires_at: Ms,
}

/// Process-local backend: entries expire lazily on read and in bulk via
/// `purge_expired` from the sweeper.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry past its deadline; returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before - self.entries.len()
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now_ms() {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = now_ms() + ttl.as_millis() as Ms;
        self.entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let matched = match pattern.strip_suffix('*') {
            Some(prefix) => self
                .entries
                .iter()
                .filter(|e| e.key().starts_with(prefix))
                .map(|e| e.key().clone())
                .collect(),
            None => {
                if self.entries.contains_key(pattern) {
                    vec![pattern.to_string()]
                } else {
                    Vec::new()
                }
            }
        };
        Ok(matched)
    }
}

/// Backend that stores nothing. Every read misses, every write succeeds.
pub struct NoopCache;

#[async_trait]
impl KeyValueCache for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Ok(None)
    }
    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }
    async fn del(&self, _keys: &[String]) -> Result<(), CacheError> {
        Ok(())
    }
    async fn keys(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub booking: Duration,
    pub list: Duration,
    pub availability: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            booking: Duration::from_secs(300),
            list: Duration::from_secs(300),
            availability: Duration::from_secs(60),
        }
    }
}

/// Owns the key scheme and the invalidation fan-out. Every failure on this
/// path is logged and swallowed; the cache never fails a mutation.
#[derive(Clone)]
pub struct CacheCoordinator {
    backend: Arc<dyn KeyValueCache>,
    ttls: CacheTtls,
}

impl CacheCoordinator {
    pub fn new(backend: Arc<dyn KeyValueCache>, ttls: CacheTtls) -> Self {
        Self { backend, ttls }
    }

    /// Coordinator over a no-op backend, for tests and cache-less deployments.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCache), CacheTtls::default())
    }

    // ── Key scheme ───────────────────────────────────────────────

    pub fn booking_key(id: BookingId) -> String {
        format!("booking:{id}")
    }

    /// Lists land under the most specific party in the filter, so party-level
    /// invalidation reaches them by prefix.
    pub fn list_key(filter: &crate::store::BookingFilter) -> String {
        let sig = filter.signature();
        if let Some(cid) = filter.client_id {
            format!("bookings:client:{cid}:{sig}")
        } else if let Some(pid) = filter.provider_id {
            format!("bookings:provider:{pid}:{sig}")
        } else {
            format!("bookings:all:{sig}")
        }
    }

    pub fn availability_key(
        provider_id: ProviderId,
        query: &TimeRange,
        min_duration: Option<Ms>,
    ) -> String {
        format!(
            "availability:{provider_id}:{}:{}:{}",
            query.start,
            query.end,
            min_duration.unwrap_or(0)
        )
    }

    // ── Read-through helpers ─────────────────────────────────────

    pub async fn get_booking(&self, id: BookingId) -> Option<Booking> {
        self.get_decoded(&Self::booking_key(id)).await
    }

    pub async fn put_booking(&self, booking: &Booking) {
        self.put_encoded(&Self::booking_key(booking.id), booking, self.ttls.booking)
            .await;
    }

    pub async fn get_page(&self, key: &str) -> Option<BookingPage> {
        self.get_decoded(key).await
    }

    pub async fn put_page(&self, key: &str, page: &BookingPage) {
        self.put_encoded(key, page, self.ttls.list).await;
    }

    pub async fn get_windows(&self, key: &str) -> Option<Vec<TimeRange>> {
        self.get_decoded(key).await
    }

    pub async fn put_windows(&self, key: &str, windows: &[TimeRange]) {
        self.put_encoded(key, &windows.to_vec(), self.ttls.availability)
            .await;
    }

    async fn get_decoded<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match bincode::deserialize(&raw) {
                Ok(value) => {
                    metrics::counter!(observability::CACHE_HITS_TOTAL).increment(1);
                    Some(value)
                }
                Err(e) => {
                    metrics::counter!(observability::CACHE_ERRORS_TOTAL).increment(1);
                    warn!(key, error = %e, "dropping undecodable cache entry");
                    let _ = self.backend.del(&[key.to_string()]).await;
                    None
                }
            },
            Ok(None) => {
                metrics::counter!(observability::CACHE_MISSES_TOTAL).increment(1);
                None
            }
            Err(e) => {
                metrics::counter!(observability::CACHE_ERRORS_TOTAL).increment(1);
                warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn put_encoded<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match bincode::serialize(value) {
            Ok(raw) => Bytes::from(raw),
            Err(e) => {
                metrics::counter!(observability::CACHE_ERRORS_TOTAL).increment(1);
                warn!(key, error = %e, "cache encode failed");
                return;
            }
        };
        if let Err(e) = self.backend.set(key, raw, ttl).await {
            metrics::counter!(observability::CACHE_ERRORS_TOTAL).increment(1);
            warn!(key, error = %e, "cache write failed");
        }
    }

    // ── Invalidation ─────────────────────────────────────────────

    /// Clear everything a booking mutation can stale: the booking itself,
    /// the client's and provider's listings, global listings, and the
    /// provider's availability windows.
    pub async fn invalidate_for_booking(
        &self,
        booking_id: BookingId,
        client_id: ClientId,
        provider_id: ProviderId,
    ) {
        let patterns = [
            format!("bookings:client:{client_id}:*"),
            format!("bookings:provider:{provider_id}:*"),
            "bookings:all:*".to_string(),
            format!("availability:{provider_id}:*"),
        ];
        self.delete_keys_and_patterns(vec![Self::booking_key(booking_id)], &patterns)
            .await;
    }

    /// Provider-scoped variant for mutations that touch no single booking.
    pub async fn invalidate_provider(&self, provider_id: ProviderId) {
        let patterns = [
            format!("bookings:provider:{provider_id}:*"),
            "bookings:all:*".to_string(),
            format!("availability:{provider_id}:*"),
        ];
        self.delete_keys_and_patterns(Vec::new(), &patterns).await;
    }

    async fn delete_keys_and_patterns(&self, mut keys: Vec<String>, patterns: &[String]) {
        let lookups = patterns.iter().map(|p| self.backend.keys(p));
        for result in futures::future::join_all(lookups).await {
            match result {
                Ok(matched) => keys.extend(matched),
                Err(e) => {
                    metrics::counter!(observability::CACHE_ERRORS_TOTAL).increment(1);
                    warn!(error = %e, "cache key scan failed");
                }
            }
        }
        if keys.is_empty() {
            return;
        }
        match self.backend.del(&keys).await {
            Ok(()) => {
                metrics::counter!(observability::CACHE_INVALIDATIONS_TOTAL)
                    .increment(keys.len() as u64);
            }
            Err(e) => {
                metrics::counter!(observability::CACHE_ERRORS_TOTAL).increment(1);
                warn!(error = %e, "cache invalidation failed");
            }
        }
    }
}
