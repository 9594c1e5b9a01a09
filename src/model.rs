use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub type BookingId = Ulid;
pub type ClientId = Ulid;
pub type ProviderId = Ulid;
pub type ServiceItemId = Ulid;
pub type SlotId = Ulid;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Ms,
    pub end: Ms,
}

impl TimeRange {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[allow(dead_code)]
    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_range(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Booking lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
}

impl BookingStatus {
    /// The one transition table. Every status change in the engine goes
    /// through this; nothing else encodes reachability.
    pub fn allowed_transitions(self) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match self {
            Scheduled => &[InProgress, Cancelled, Rescheduled],
            InProgress => &[Completed, Cancelled],
            Completed | Cancelled | Rescheduled => &[],
        }
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Active bookings hold provider time.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Scheduled | BookingStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rescheduled => "rescheduled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client's appointment with a provider. Never physically deleted;
/// cancellation and reschedule are status transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub client_id: ClientId,
    pub provider_id: ProviderId,
    pub service_item_id: Option<ServiceItemId>,
    pub range: TimeRange,
    pub status: BookingStatus,
    /// Label carried for reporting; not a conflict dimension.
    pub service_type: Option<String>,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    /// Set on the superseded booking when a reschedule creates its successor.
    pub rescheduled_to: Option<BookingId>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// A reservation of provider time backing one active booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotHold {
    pub slot_id: SlotId,
    pub booking_id: BookingId,
    pub range: TimeRange,
    pub service_type: Option<String>,
}

/// One provider's slot holds, sorted by `range.start`.
#[derive(Debug, Clone)]
pub struct ProviderSlots {
    pub provider_id: ProviderId,
    pub holds: Vec<SlotHold>,
}

impl ProviderSlots {
    pub fn new(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            holds: Vec::new(),
        }
    }

    /// Insert hold maintaining sort order by range.start.
    pub fn insert_hold(&mut self, hold: SlotHold) {
        let pos = self
            .holds
            .binary_search_by_key(&hold.range.start, |h| h.range.start)
            .unwrap_or_else(|e| e);
        self.holds.insert(pos, hold);
    }

    /// Remove the hold backing a booking, if one exists.
    pub fn remove_by_booking(&mut self, booking_id: BookingId) -> Option<SlotHold> {
        if let Some(pos) = self.holds.iter().position(|h| h.booking_id == booking_id) {
            Some(self.holds.remove(pos))
        } else {
            None
        }
    }

    pub fn hold_for_booking(&self, booking_id: BookingId) -> Option<&SlotHold> {
        self.holds.iter().find(|h| h.booking_id == booking_id)
    }

    /// Return only holds whose range overlaps the query window.
    /// Uses binary search to skip holds starting at or after `query.end`.
    pub fn overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &SlotHold> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.holds.partition_point(|h| h.range.start < query.end);
        self.holds[..right_bound]
            .iter()
            .filter(move |h| h.range.end > query.start)
    }

    /// First hold blocking `range`, ignoring the hold of `exclude` when set.
    pub fn first_conflict(
        &self,
        range: &TimeRange,
        exclude: Option<BookingId>,
    ) -> Option<&SlotHold> {
        self.overlapping(range)
            .find(|h| Some(h.booking_id) != exclude)
    }
}

/// Cancellation inputs recorded on the soft-deleted booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationInfo {
    pub reason: Option<String>,
    pub cancelled_by: Option<String>,
}

/// Outcome of a reschedule: the successor booking and the recorded reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleInfo {
    pub original_id: BookingId,
    pub new_booking: Booking,
    pub reason: Option<String>,
}

/// Inputs for creating a booking (and for the replacement half of a
/// reschedule).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub client_id: ClientId,
    pub provider_id: ProviderId,
    pub service_item_id: Option<ServiceItemId>,
    pub range: TimeRange,
    pub service_type: Option<String>,
    pub notes: Option<String>,
    pub location: Option<String>,
}

/// Mutable non-time fields. Time changes go through reschedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBooking {
    pub notes: Option<String>,
    pub location: Option<String>,
}

// ── Query result types ───────────────────────────────────────────

/// One page of a filtered booking listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPage {
    pub items: Vec<Booking>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// Display data for a client or provider, resolved through the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySummary {
    pub id: Ulid,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub id: ServiceItemId,
    pub name: String,
    pub duration_ms: Option<Ms>,
}

/// Booking joined with whatever party/service data the directory knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedBooking {
    pub booking: Booking,
    pub client: Option<PartySummary>,
    pub provider: Option<PartySummary>,
    pub service: Option<ServiceSummary>,
}
