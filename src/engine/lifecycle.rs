use std::time::Instant;

use tracing::{error, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{ensure_len, now_ms, validate_new_booking};
use super::{observe_op, Engine, EngineError};

fn ensure_transition(from: BookingStatus, to: BookingStatus) -> Result<(), EngineError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

impl Engine {
    /// Validate, take the provider slot, then persist. The hold is released
    /// again if the store rejects the row, so a failed create leaves no
    /// trace in either place.
    pub async fn create_booking(&self, req: NewBooking) -> Result<Booking, EngineError> {
        let start = Instant::now();
        let result = self.do_create(req).await;
        observe_op("create_booking", start, &result);
        result
    }

    async fn do_create(&self, req: NewBooking) -> Result<Booking, EngineError> {
        validate_new_booking(&req)?;
        let provider_id = req.provider_id;

        // Advisory probe; the reserve below re-checks under the provider
        // lock and is the authoritative answer.
        if !self
            .ledger
            .check_availability(provider_id, req.range, None)
            .await
        {
            return Err(EngineError::Validation(format!(
                "provider {provider_id} is not available in [{}, {})",
                req.range.start, req.range.end
            )));
        }

        let id = Ulid::new();
        let now = now_ms();
        self.ledger
            .reserve(provider_id, id, req.range, req.service_type.clone())
            .await?;

        let booking = Booking {
            id,
            client_id: req.client_id,
            provider_id,
            service_item_id: req.service_item_id,
            range: req.range,
            status: BookingStatus::Scheduled,
            service_type: req.service_type,
            notes: req.notes,
            location: req.location,
            cancellation_reason: None,
            cancelled_by: None,
            rescheduled_to: None,
            created_at: now,
            updated_at: now,
        };

        match self.store.create(booking).await {
            Ok(created) => {
                metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
                info!(
                    booking = %created.id,
                    client = %created.client_id,
                    provider = %created.provider_id,
                    "booking created"
                );
                self.cache
                    .invalidate_for_booking(created.id, created.client_id, created.provider_id)
                    .await;
                Ok(created)
            }
            Err(e) => {
                error!(booking = %id, error = %e, "store rejected new booking, releasing its hold");
                self.ledger.release(provider_id, id).await;
                Err(e.into())
            }
        }
    }

    /// Soft cancellation: the record keeps existing with status Cancelled
    /// and the who/why recorded; the provider slot opens up again.
    pub async fn cancel_booking(
        &self,
        id: BookingId,
        info: CancellationInfo,
    ) -> Result<Booking, EngineError> {
        let start = Instant::now();
        let result = self.do_cancel(id, info).await;
        observe_op("cancel_booking", start, &result);
        result
    }

    async fn do_cancel(
        &self,
        id: BookingId,
        info: CancellationInfo,
    ) -> Result<Booking, EngineError> {
        ensure_len(info.reason.as_deref(), MAX_REASON_LEN, "cancellation reason too long")?;
        ensure_len(info.cancelled_by.as_deref(), MAX_ACTOR_LEN, "cancelled_by too long")?;

        let booking = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        ensure_transition(booking.status, BookingStatus::Cancelled)?;

        let cancelled = self.store.delete(id, &info, now_ms()).await?;
        let released = self.ledger.release(cancelled.provider_id, id).await;

        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        info!(booking = %id, released, "booking cancelled");
        self.cache
            .invalidate_for_booking(id, cancelled.client_id, cancelled.provider_id)
            .await;
        Ok(cancelled)
    }

    /// Replace a scheduled booking with a successor at a new time (and
    /// possibly a new provider). Slot movement and the store pair-write
    /// each happen atomically; if the pair-write fails the slot movement
    /// is reversed, so no half-rescheduled state survives.
    pub async fn reschedule_booking(
        &self,
        id: BookingId,
        req: NewBooking,
        reason: Option<String>,
    ) -> Result<RescheduleInfo, EngineError> {
        let start = Instant::now();
        let result = self.do_reschedule(id, req, reason).await;
        observe_op("reschedule_booking", start, &result);
        result
    }

    async fn do_reschedule(
        &self,
        id: BookingId,
        req: NewBooking,
        reason: Option<String>,
    ) -> Result<RescheduleInfo, EngineError> {
        validate_new_booking(&req)?;
        ensure_len(reason.as_deref(), MAX_REASON_LEN, "reschedule reason too long")?;

        let original = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        ensure_transition(original.status, BookingStatus::Rescheduled)?;
        if req.client_id != original.client_id {
            return Err(EngineError::Validation(
                "reschedule cannot move a booking to another client".into(),
            ));
        }

        let new_id = Ulid::new();
        let now = now_ms();
        let (_slot, displaced) = self
            .ledger
            .transfer(
                original.provider_id,
                id,
                req.provider_id,
                new_id,
                req.range,
                req.service_type.clone(),
            )
            .await?;

        let new_booking = Booking {
            id: new_id,
            client_id: original.client_id,
            provider_id: req.provider_id,
            service_item_id: req.service_item_id,
            range: req.range,
            status: BookingStatus::Scheduled,
            service_type: req.service_type,
            notes: req.notes,
            location: req.location,
            cancellation_reason: None,
            cancelled_by: None,
            rescheduled_to: None,
            created_at: now,
            updated_at: now,
        };
        let mut updated_original = original.clone();
        updated_original.status = BookingStatus::Rescheduled;
        updated_original.rescheduled_to = Some(new_id);
        updated_original.cancellation_reason = reason.clone();
        updated_original.updated_at = now;

        match self
            .store
            .apply_reschedule(new_booking.clone(), updated_original)
            .await
        {
            Ok(()) => {
                metrics::counter!(observability::BOOKINGS_RESCHEDULED_TOTAL).increment(1);
                info!(
                    original = %id,
                    successor = %new_id,
                    provider = %new_booking.provider_id,
                    "booking rescheduled"
                );
                self.cache
                    .invalidate_for_booking(id, original.client_id, original.provider_id)
                    .await;
                if new_booking.provider_id != original.provider_id {
                    self.cache.invalidate_provider(new_booking.provider_id).await;
                }
                Ok(RescheduleInfo {
                    original_id: id,
                    new_booking,
                    reason,
                })
            }
            Err(e) => {
                error!(original = %id, error = %e, "reschedule pair-write failed, restoring old hold");
                self.undo_transfer(original.provider_id, id, req.provider_id, new_id, displaced)
                    .await;
                Err(e.into())
            }
        }
    }

    /// Reverse a transfer whose store write failed. Best effort: when the
    /// old window was claimed in the meantime, the successor hold is dropped
    /// and the booking is left without a hold rather than double-held.
    async fn undo_transfer(
        &self,
        old_provider: ProviderId,
        old_booking: BookingId,
        new_provider: ProviderId,
        new_booking: BookingId,
        displaced: Option<SlotHold>,
    ) {
        let Some(old_hold) = displaced else {
            self.ledger.release(new_provider, new_booking).await;
            return;
        };
        if self
            .ledger
            .transfer(
                new_provider,
                new_booking,
                old_provider,
                old_booking,
                old_hold.range,
                old_hold.service_type,
            )
            .await
            .is_err()
        {
            self.ledger.release(new_provider, new_booking).await;
            error!(booking = %old_booking, "could not restore the original hold");
        }
    }

    /// Move a booking through the status table. Repeating the current
    /// status is a no-op; entering a terminal status releases the hold.
    pub async fn update_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let start = Instant::now();
        let result = self.do_update_status(id, status).await;
        observe_op("update_status", start, &result);
        result
    }

    pub async fn start_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        let start = Instant::now();
        let result = self.do_update_status(id, BookingStatus::InProgress).await;
        observe_op("start_booking", start, &result);
        result
    }

    pub async fn complete_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        let start = Instant::now();
        let result = self.do_update_status(id, BookingStatus::Completed).await;
        observe_op("complete_booking", start, &result);
        result
    }

    async fn do_update_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let booking = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        if booking.status == status {
            return Ok(booking);
        }
        ensure_transition(booking.status, status)?;

        let updated = self.store.update_status(id, status, now_ms()).await?;
        if status.is_terminal() {
            let released = self.ledger.release(updated.provider_id, id).await;
            info!(booking = %id, status = %status, released, "booking closed");
        } else {
            info!(booking = %id, status = %status, "booking status updated");
        }
        self.cache
            .invalidate_for_booking(id, updated.client_id, updated.provider_id)
            .await;
        Ok(updated)
    }

    /// Patch the free-text fields. Time and provider changes go through
    /// reschedule; terminal bookings are immutable.
    pub async fn update_booking(
        &self,
        id: BookingId,
        patch: UpdateBooking,
    ) -> Result<Booking, EngineError> {
        let start = Instant::now();
        let result = self.do_update_details(id, patch).await;
        observe_op("update_booking", start, &result);
        result
    }

    async fn do_update_details(
        &self,
        id: BookingId,
        patch: UpdateBooking,
    ) -> Result<Booking, EngineError> {
        ensure_len(patch.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
        ensure_len(patch.location.as_deref(), MAX_LOCATION_LEN, "location too long")?;

        let mut booking = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        if booking.status.is_terminal() {
            return Err(EngineError::Validation(format!(
                "cannot update a {} booking",
                booking.status
            )));
        }
        if patch.notes.is_none() && patch.location.is_none() {
            return Ok(booking);
        }

        if let Some(notes) = patch.notes {
            booking.notes = Some(notes);
        }
        if let Some(location) = patch.location {
            booking.location = Some(location);
        }
        booking.updated_at = now_ms();

        let updated = self.store.update(booking).await?;
        self.cache
            .invalidate_for_booking(id, updated.client_id, updated.provider_id)
            .await;
        Ok(updated)
    }
}
