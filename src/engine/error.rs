use crate::model::{BookingId, BookingStatus, ProviderId, TimeRange};
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or unacceptable input, including an unavailable provider.
    Validation(String),
    /// Status change not permitted by the transition table.
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    NotFound(BookingId),
    /// Reservation lost to an existing hold.
    Conflict {
        provider_id: ProviderId,
        range: TimeRange,
        existing_booking: BookingId,
    },
    LimitExceeded(&'static str),
    /// Store failure surfaced after validation passed.
    Internal(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation: {msg}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition from {from} to {to}")
            }
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::Conflict {
                provider_id,
                range,
                existing_booking,
            } => {
                write!(
                    f,
                    "provider {provider_id} already booked in [{}, {}) by {existing_booking}",
                    range.start, range.end
                )
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// A missing row keeps its identity; everything else the store reports is an
/// internal failure as far as callers are concerned.
impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl EngineError {
    /// Stable machine-readable tag, for logs and embedding layers.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Internal(_) => "internal",
        }
    }
}
