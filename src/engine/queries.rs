use std::time::Instant;

use crate::cache::CacheCoordinator;
use crate::model::*;
use crate::store::BookingFilter;

use super::conflict::validate_query_window;
use super::{observe_op, Engine, EngineError};

impl Engine {
    /// Single-booking read, served from cache when possible.
    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        let start = Instant::now();
        let result = self.do_get(id).await;
        observe_op("get_booking", start, &result);
        result
    }

    async fn do_get(&self, id: BookingId) -> Result<Booking, EngineError> {
        if let Some(hit) = self.cache.get_booking(id).await {
            return Ok(hit);
        }
        let booking = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        self.cache.put_booking(&booking).await;
        Ok(booking)
    }

    /// Booking joined with directory summaries. Reads the store directly so
    /// directory edits show up without waiting out a TTL.
    pub async fn get_booking_detailed(&self, id: BookingId) -> Result<DetailedBooking, EngineError> {
        let start = Instant::now();
        let result = async {
            self.store
                .find_detailed_by_id(id)
                .await?
                .ok_or(EngineError::NotFound(id))
        }
        .await;
        observe_op("get_booking_detailed", start, &result);
        result
    }

    /// Filtered, sorted, paginated listing. Pages are cached under the
    /// filter signature and dropped whenever a matching party mutates.
    pub async fn list_bookings(&self, filter: &BookingFilter) -> Result<BookingPage, EngineError> {
        let start = Instant::now();
        let result = self.do_list(filter).await;
        observe_op("list_bookings", start, &result);
        result
    }

    async fn do_list(&self, filter: &BookingFilter) -> Result<BookingPage, EngineError> {
        if let Some(window) = &filter.range {
            validate_query_window(window)?;
        }
        let key = CacheCoordinator::list_key(filter);
        if let Some(page) = self.cache.get_page(&key).await {
            return Ok(page);
        }
        let page = self.store.find_all(filter).await?;
        self.cache.put_page(&key, &page).await;
        Ok(page)
    }

    /// True when something blocks `range` on the provider. `exclude` skips
    /// one booking's own hold so a move can probe its target window.
    pub async fn check_conflicts(
        &self,
        provider_id: ProviderId,
        range: TimeRange,
        exclude: Option<BookingId>,
    ) -> Result<bool, EngineError> {
        let start = Instant::now();
        let result = async {
            validate_query_window(&range)?;
            Ok(!self
                .ledger
                .check_availability(provider_id, range, exclude)
                .await)
        }
        .await;
        observe_op("check_conflicts", start, &result);
        result
    }

    /// Open windows for a provider inside `query`, optionally dropping
    /// fragments shorter than `min_duration`.
    pub async fn provider_free_windows(
        &self,
        provider_id: ProviderId,
        query: TimeRange,
        min_duration: Option<Ms>,
    ) -> Result<Vec<TimeRange>, EngineError> {
        let start = Instant::now();
        let result = self.do_free_windows(provider_id, query, min_duration).await;
        observe_op("provider_free_windows", start, &result);
        result
    }

    async fn do_free_windows(
        &self,
        provider_id: ProviderId,
        query: TimeRange,
        min_duration: Option<Ms>,
    ) -> Result<Vec<TimeRange>, EngineError> {
        validate_query_window(&query)?;
        let key = CacheCoordinator::availability_key(provider_id, &query, min_duration);
        if let Some(windows) = self.cache.get_windows(&key).await {
            return Ok(windows);
        }
        let windows = self
            .ledger
            .free_windows(provider_id, query, min_duration)
            .await;
        self.cache.put_windows(&key, &windows).await;
        Ok(windows)
    }
}
