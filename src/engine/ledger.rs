use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::MAX_HOLDS_PER_PROVIDER;
use crate::model::*;

use super::availability::free_windows_in;
use super::EngineError;

pub type SharedProviderSlots = Arc<RwLock<ProviderSlots>>;

/// Availability boundary consumed by the lifecycle operations.
///
/// `reserve` is the only way to take provider time, and it re-checks for
/// conflicts inside the provider's write lock; a check followed by a reserve
/// is advisory, the reserve itself is authoritative.
#[async_trait]
pub trait ProviderAvailability: Send + Sync {
    /// Advisory read: true when `range` has no blocking hold. `exclude` skips
    /// one booking's own hold, for replacement-window probes.
    async fn check_availability(
        &self,
        provider_id: ProviderId,
        range: TimeRange,
        exclude: Option<BookingId>,
    ) -> bool;

    /// Take the slot or fail with `Conflict`. Check and insert happen under
    /// one provider write guard.
    async fn reserve(
        &self,
        provider_id: ProviderId,
        booking_id: BookingId,
        range: TimeRange,
        service_type: Option<String>,
    ) -> Result<SlotId, EngineError>;

    /// Drop the hold backing `booking_id`. Idempotent; returns false when no
    /// hold existed.
    async fn release(&self, provider_id: ProviderId, booking_id: BookingId) -> bool;

    /// Move a booking's time in one step: verify `new_range` on the target
    /// provider, insert the successor hold, remove the old one. Returns the
    /// new slot id and the displaced hold (for a compensating reverse
    /// transfer). Nothing changes on failure.
    async fn transfer(
        &self,
        old_provider: ProviderId,
        old_booking: BookingId,
        new_provider: ProviderId,
        new_booking: BookingId,
        new_range: TimeRange,
        service_type: Option<String>,
    ) -> Result<(SlotId, Option<SlotHold>), EngineError>;

    /// Open time inside `query`, smallest-first by start.
    async fn free_windows(
        &self,
        provider_id: ProviderId,
        query: TimeRange,
        min_duration: Option<Ms>,
    ) -> Vec<TimeRange>;
}

/// In-memory ledger: one lock per provider, entries created lazily on first
/// reservation.
pub struct SlotLedger {
    providers: DashMap<ProviderId, SharedProviderSlots>,
}

impl SlotLedger {
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    fn entry(&self, provider_id: ProviderId) -> SharedProviderSlots {
        self.providers
            .entry(provider_id)
            .or_insert_with(|| Arc::new(RwLock::new(ProviderSlots::new(provider_id))))
            .clone()
    }

    /// Clone the Arc out of the map before locking; never await while holding
    /// a map shard.
    fn lookup(&self, provider_id: &ProviderId) -> Option<SharedProviderSlots> {
        self.providers.get(provider_id).map(|e| e.value().clone())
    }
}

impl Default for SlotLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAvailability for SlotLedger {
    async fn check_availability(
        &self,
        provider_id: ProviderId,
        range: TimeRange,
        exclude: Option<BookingId>,
    ) -> bool {
        match self.lookup(&provider_id) {
            Some(slots) => {
                let guard = slots.read().await;
                guard.first_conflict(&range, exclude).is_none()
            }
            // Provider with no ledger entry has no holds.
            None => true,
        }
    }

    async fn reserve(
        &self,
        provider_id: ProviderId,
        booking_id: BookingId,
        range: TimeRange,
        service_type: Option<String>,
    ) -> Result<SlotId, EngineError> {
        let slots = self.entry(provider_id);
        let mut guard = slots.write().await;

        if guard.holds.len() >= MAX_HOLDS_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many holds on provider"));
        }
        if let Some(existing) = guard.first_conflict(&range, None) {
            metrics::counter!(crate::observability::RESERVE_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict {
                provider_id,
                range,
                existing_booking: existing.booking_id,
            });
        }

        let slot_id = Ulid::new();
        guard.insert_hold(SlotHold {
            slot_id,
            booking_id,
            range,
            service_type,
        });
        Ok(slot_id)
    }

    async fn release(&self, provider_id: ProviderId, booking_id: BookingId) -> bool {
        let Some(slots) = self.lookup(&provider_id) else {
            return false;
        };
        let mut guard = slots.write().await;
        guard.remove_by_booking(booking_id).is_some()
    }

    async fn transfer(
        &self,
        old_provider: ProviderId,
        old_booking: BookingId,
        new_provider: ProviderId,
        new_booking: BookingId,
        new_range: TimeRange,
        service_type: Option<String>,
    ) -> Result<(SlotId, Option<SlotHold>), EngineError> {
        if old_provider == new_provider {
            let slots = self.entry(old_provider);
            let mut guard = slots.write().await;

            // The booking's own hold never blocks its replacement window.
            if let Some(existing) = guard.first_conflict(&new_range, Some(old_booking)) {
                metrics::counter!(crate::observability::RESERVE_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::Conflict {
                    provider_id: new_provider,
                    range: new_range,
                    existing_booking: existing.booking_id,
                });
            }
            if guard.hold_for_booking(old_booking).is_none()
                && guard.holds.len() >= MAX_HOLDS_PER_PROVIDER
            {
                return Err(EngineError::LimitExceeded("too many holds on provider"));
            }

            let displaced = guard.remove_by_booking(old_booking);
            let slot_id = Ulid::new();
            guard.insert_hold(SlotHold {
                slot_id,
                booking_id: new_booking,
                range: new_range,
                service_type,
            });
            return Ok((slot_id, displaced));
        }

        // Acquire write locks in sorted order to prevent deadlocks.
        let (first_id, second_id) = if old_provider < new_provider {
            (old_provider, new_provider)
        } else {
            (new_provider, old_provider)
        };
        let first_arc = self.entry(first_id);
        let second_arc = self.entry(second_id);
        let first_guard = first_arc.write_owned().await;
        let second_guard = second_arc.write_owned().await;
        let (mut old_guard, mut new_guard) = if first_id == old_provider {
            (first_guard, second_guard)
        } else {
            (second_guard, first_guard)
        };

        if new_guard.holds.len() >= MAX_HOLDS_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many holds on provider"));
        }
        if let Some(existing) = new_guard.first_conflict(&new_range, None) {
            metrics::counter!(crate::observability::RESERVE_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict {
                provider_id: new_provider,
                range: new_range,
                existing_booking: existing.booking_id,
            });
        }

        let displaced = old_guard.remove_by_booking(old_booking);
        let slot_id = Ulid::new();
        new_guard.insert_hold(SlotHold {
            slot_id,
            booking_id: new_booking,
            range: new_range,
            service_type,
        });
        Ok((slot_id, displaced))
    }

    async fn free_windows(
        &self,
        provider_id: ProviderId,
        query: TimeRange,
        min_duration: Option<Ms>,
    ) -> Vec<TimeRange> {
        match self.lookup(&provider_id) {
            Some(slots) => {
                let guard = slots.read().await;
                free_windows_in(&guard, &query, min_duration)
            }
            None => {
                let mut windows = vec![query];
                if let Some(min) = min_duration {
                    windows.retain(|w| w.duration_ms() >= min);
                }
                windows
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    fn range(start: Ms, end: Ms) -> TimeRange {
        TimeRange::new(start, end)
    }

    #[tokio::test]
    async fn reserve_then_overlap_conflicts() {
        let ledger = SlotLedger::new();
        let provider = Ulid::new();
        let first = Ulid::new();

        ledger
            .reserve(provider, first, range(10 * H, 11 * H), None)
            .await
            .unwrap();

        let err = ledger
            .reserve(provider, Ulid::new(), range(10 * H + 1_800_000, 11 * H + 1_800_000), None)
            .await
            .unwrap_err();
        match err {
            EngineError::Conflict {
                existing_booking, ..
            } => assert_eq!(existing_booking, first),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn touching_ranges_both_reserve() {
        let ledger = SlotLedger::new();
        let provider = Ulid::new();

        ledger
            .reserve(provider, Ulid::new(), range(10 * H, 11 * H), None)
            .await
            .unwrap();
        ledger
            .reserve(provider, Ulid::new(), range(11 * H, 12 * H), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let ledger = SlotLedger::new();
        let provider = Ulid::new();
        let booking = Ulid::new();

        ledger
            .reserve(provider, booking, range(10 * H, 11 * H), None)
            .await
            .unwrap();
        assert!(ledger.release(provider, booking).await);
        assert!(!ledger.release(provider, booking).await);
        assert!(!ledger.release(Ulid::new(), booking).await);
    }

    #[tokio::test]
    async fn released_slot_is_reservable_again() {
        let ledger = SlotLedger::new();
        let provider = Ulid::new();
        let booking = Ulid::new();
        let r = range(10 * H, 11 * H);

        ledger.reserve(provider, booking, r, None).await.unwrap();
        assert!(!ledger.check_availability(provider, r, None).await);
        ledger.release(provider, booking).await;
        assert!(ledger.check_availability(provider, r, None).await);
        ledger.reserve(provider, Ulid::new(), r, None).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_reserves_one_winner() {
        let ledger = Arc::new(SlotLedger::new());
        let provider = Ulid::new();
        let r = range(10 * H, 11 * H);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve(provider, Ulid::new(), r, None).await
            }));
        }

        let mut won = 0;
        let mut lost = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => won += 1,
                Err(EngineError::Conflict { .. }) => lost += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(lost, 7);
    }

    #[tokio::test]
    async fn transfer_same_provider_overlapping_self_ok() {
        let ledger = SlotLedger::new();
        let provider = Ulid::new();
        let old_booking = Ulid::new();
        let new_booking = Ulid::new();

        ledger
            .reserve(provider, old_booking, range(10 * H, 11 * H), None)
            .await
            .unwrap();

        // Shift by 30 minutes; overlaps only its own hold.
        let (_, displaced) = ledger
            .transfer(
                provider,
                old_booking,
                provider,
                new_booking,
                range(10 * H + 1_800_000, 11 * H + 1_800_000),
                None,
            )
            .await
            .unwrap();
        assert!(displaced.is_some());
        assert!(
            ledger
                .check_availability(provider, range(10 * H, 10 * H + 1_800_000), None)
                .await
        );
        assert!(
            !ledger
                .check_availability(provider, range(11 * H, 11 * H + 1_800_000), None)
                .await
        );
    }

    #[tokio::test]
    async fn transfer_cross_provider_moves_hold() {
        let ledger = SlotLedger::new();
        let a = Ulid::new();
        let b = Ulid::new();
        let old_booking = Ulid::new();
        let new_booking = Ulid::new();
        let r = range(10 * H, 11 * H);

        ledger.reserve(a, old_booking, r, None).await.unwrap();
        ledger
            .transfer(a, old_booking, b, new_booking, r, None)
            .await
            .unwrap();

        assert!(ledger.check_availability(a, r, None).await);
        assert!(!ledger.check_availability(b, r, None).await);
    }

    #[tokio::test]
    async fn failed_transfer_leaves_old_hold() {
        let ledger = SlotLedger::new();
        let a = Ulid::new();
        let b = Ulid::new();
        let old_booking = Ulid::new();
        let r = range(10 * H, 11 * H);

        ledger.reserve(a, old_booking, r, None).await.unwrap();
        // Target window already taken on b.
        ledger.reserve(b, Ulid::new(), r, None).await.unwrap();

        let err = ledger
            .transfer(a, old_booking, b, Ulid::new(), r, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
        assert!(!ledger.check_availability(a, r, None).await);
    }

    #[tokio::test]
    async fn free_windows_unknown_provider_is_open() {
        let ledger = SlotLedger::new();
        let query = range(9 * H, 17 * H);
        let windows = ledger.free_windows(Ulid::new(), query, None).await;
        assert_eq!(windows, vec![query]);
    }
}
