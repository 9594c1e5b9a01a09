use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::model::*;

#[derive(Debug)]
pub enum StoreError {
    NotFound(BookingId),
    DuplicateId(BookingId),
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "booking not found: {id}"),
            StoreError::DuplicateId(id) => write!(f, "booking id already exists: {id}"),
            StoreError::Backend(e) => write!(f, "store backend: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    StartTime,
    CreatedAt,
    UpdatedAt,
    Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// Retrieval parameters. Serializes to the canonical JSON used as the list
/// cache signature, so field order here is part of the key format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookingFilter {
    pub client_id: Option<ClientId>,
    pub provider_id: Option<ProviderId>,
    pub service_item_id: Option<ServiceItemId>,
    pub status: Option<BookingStatus>,
    /// Matches bookings whose range overlaps this window (half-open).
    pub range: Option<TimeRange>,
    /// 1-indexed.
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub sort: SortField,
    pub dir: SortDir,
}

impl BookingFilter {
    pub fn signature(&self) -> String {
        serde_json::to_string(self).expect("filter is plain json")
    }

    pub fn matches(&self, b: &Booking) -> bool {
        if let Some(cid) = self.client_id
            && b.client_id != cid {
                return false;
            }
        if let Some(pid) = self.provider_id
            && b.provider_id != pid {
                return false;
            }
        if let Some(sid) = self.service_item_id
            && b.service_item_id != Some(sid) {
                return false;
            }
        if let Some(status) = self.status
            && b.status != status {
                return false;
            }
        if let Some(window) = self.range
            && !b.range.overlaps(&window) {
                return false;
            }
        true
    }

    /// Effective (page, limit): page floors at 1, limit clamps to the cap.
    pub fn page_params(&self) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        (page, limit)
    }
}

/// Transactional record boundary. Bookings are soft-deleted only; `delete`
/// is the cancellation write and every read keeps returning the record.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create(&self, booking: Booking) -> Result<Booking, StoreError>;

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    async fn find_detailed_by_id(
        &self,
        id: BookingId,
    ) -> Result<Option<DetailedBooking>, StoreError>;

    async fn find_all(&self, filter: &BookingFilter) -> Result<BookingPage, StoreError>;

    /// Full-record replace by id.
    async fn update(&self, booking: Booking) -> Result<Booking, StoreError>;

    async fn update_status(
        &self,
        id: BookingId,
        status: BookingStatus,
        now: Ms,
    ) -> Result<Booking, StoreError>;

    /// Soft cancellation: flips status to Cancelled and records who/why.
    async fn delete(
        &self,
        id: BookingId,
        info: &CancellationInfo,
        now: Ms,
    ) -> Result<Booking, StoreError>;

    /// Reschedule pair-write: insert the successor and replace the original
    /// in one step. Readers never observe one without the other.
    async fn apply_reschedule(
        &self,
        new_booking: Booking,
        updated_original: Booking,
    ) -> Result<(), StoreError>;
}

/// Lookup boundary for the display data joined into detailed reads. Unknown
/// ids resolve to None, never an error.
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn client_summary(&self, id: ClientId) -> Option<PartySummary>;
    async fn provider_summary(&self, id: ProviderId) -> Option<PartySummary>;
    async fn service_summary(&self, id: ServiceItemId) -> Option<ServiceSummary>;
}

/// Directory that knows nobody.
pub struct NullDirectory;

#[async_trait]
impl PartyDirectory for NullDirectory {
    async fn client_summary(&self, _id: ClientId) -> Option<PartySummary> {
        None
    }
    async fn provider_summary(&self, _id: ProviderId) -> Option<PartySummary> {
        None
    }
    async fn service_summary(&self, _id: ServiceItemId) -> Option<ServiceSummary> {
        None
    }
}

/// Preloaded directory for tests and single-process embedders.
#[derive(Default)]
pub struct StaticDirectory {
    clients: DashMap<ClientId, PartySummary>,
    providers: DashMap<ProviderId, PartySummary>,
    services: DashMap<ServiceItemId, ServiceSummary>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&self, summary: PartySummary) {
        self.clients.insert(summary.id, summary);
    }

    pub fn add_provider(&self, summary: PartySummary) {
        self.providers.insert(summary.id, summary);
    }

    pub fn add_service(&self, summary: ServiceSummary) {
        self.services.insert(summary.id, summary);
    }
}

#[async_trait]
impl PartyDirectory for StaticDirectory {
    async fn client_summary(&self, id: ClientId) -> Option<PartySummary> {
        self.clients.get(&id).map(|e| e.value().clone())
    }
    async fn provider_summary(&self, id: ProviderId) -> Option<PartySummary> {
        self.providers.get(&id).map(|e| e.value().clone())
    }
    async fn service_summary(&self, id: ServiceItemId) -> Option<ServiceSummary> {
        self.services.get(&id).map(|e| e.value().clone())
    }
}

/// Store backed by one table behind a single RwLock. The pair-write in
/// `apply_reschedule` holds the write lock across both rows.
pub struct InMemoryBookingStore {
    table: RwLock<HashMap<BookingId, Booking>>,
    directory: Arc<dyn PartyDirectory>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::with_directory(Arc::new(NullDirectory))
    }

    pub fn with_directory(directory: Arc<dyn PartyDirectory>) -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
            directory,
        }
    }
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_key(sort: SortField, b: &Booking) -> (Ms, Ulid) {
    let primary = match sort {
        SortField::StartTime => b.range.start,
        SortField::CreatedAt => b.created_at,
        SortField::UpdatedAt => b.updated_at,
        // Status groups sort in declaration order.
        SortField::Status => b.status as Ms,
    };
    // Id tiebreak keeps pages stable across identical keys.
    (primary, b.id)
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn create(&self, booking: Booking) -> Result<Booking, StoreError> {
        let mut table = self.table.write().await;
        if table.contains_key(&booking.id) {
            return Err(StoreError::DuplicateId(booking.id));
        }
        table.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let table = self.table.read().await;
        Ok(table.get(&id).cloned())
    }

    async fn find_detailed_by_id(
        &self,
        id: BookingId,
    ) -> Result<Option<DetailedBooking>, StoreError> {
        let booking = {
            let table = self.table.read().await;
            table.get(&id).cloned()
        };
        let Some(booking) = booking else {
            return Ok(None);
        };
        let client = self.directory.client_summary(booking.client_id).await;
        let provider = self.directory.provider_summary(booking.provider_id).await;
        let service = match booking.service_item_id {
            Some(sid) => self.directory.service_summary(sid).await,
            None => None,
        };
        Ok(Some(DetailedBooking {
            booking,
            client,
            provider,
            service,
        }))
    }

    async fn find_all(&self, filter: &BookingFilter) -> Result<BookingPage, StoreError> {
        let table = self.table.read().await;
        let mut matched: Vec<Booking> = table
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        drop(table);

        matched.sort_by_key(|b| sort_key(filter.sort, b));
        if filter.dir == SortDir::Desc {
            matched.reverse();
        }

        let total = matched.len();
        let (page, limit) = filter.page_params();
        let total_pages = total.div_ceil(limit);
        let items: Vec<Booking> = matched
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect();

        Ok(BookingPage {
            items,
            total,
            page,
            limit,
            total_pages,
        })
    }

    async fn update(&self, booking: Booking) -> Result<Booking, StoreError> {
        let mut table = self.table.write().await;
        if !table.contains_key(&booking.id) {
            return Err(StoreError::NotFound(booking.id));
        }
        table.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn update_status(
        &self,
        id: BookingId,
        status: BookingStatus,
        now: Ms,
    ) -> Result<Booking, StoreError> {
        let mut table = self.table.write().await;
        let booking = table.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        booking.status = status;
        booking.updated_at = now;
        Ok(booking.clone())
    }

    async fn delete(
        &self,
        id: BookingId,
        info: &CancellationInfo,
        now: Ms,
    ) -> Result<Booking, StoreError> {
        let mut table = self.table.write().await;
        let booking = table.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        booking.status = BookingStatus::Cancelled;
        booking.cancellation_reason = info.reason.clone();
        booking.cancelled_by = info.cancelled_by.clone();
        booking.updated_at = now;
        Ok(booking.clone())
    }

    async fn apply_reschedule(
        &self,
        new_booking: Booking,
        updated_original: Booking,
    ) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        if table.contains_key(&new_booking.id) {
            return Err(StoreError::DuplicateId(new_booking.id));
        }
        if !table.contains_key(&updated_original.id) {
            return Err(StoreError::NotFound(updated_original.id));
        }
        table.insert(new_booking.id, new_booking);
        table.insert(updated_original.id, updated_original);
        Ok(())
    }
}
