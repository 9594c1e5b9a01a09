//! Hard bounds on inputs and state growth. Crossing one surfaces as
//! `EngineError::LimitExceeded` with the offending limit named.

use crate::model::Ms;

/// Earliest accepted timestamp (unix epoch).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// Latest accepted timestamp (2100-01-01T00:00:00Z).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single booking may not span more than 30 days.
pub const MAX_BOOKING_DURATION_MS: Ms = 30 * 24 * 3_600_000;

/// Availability and listing queries may not window more than one year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;

/// Holds per provider; protects the sorted scan from unbounded growth.
pub const MAX_HOLDS_PER_PROVIDER: usize = 10_000;

pub const MAX_NOTES_LEN: usize = 4_096;
pub const MAX_LOCATION_LEN: usize = 512;
pub const MAX_REASON_LEN: usize = 1_024;
pub const MAX_SERVICE_TYPE_LEN: usize = 128;
pub const MAX_ACTOR_LEN: usize = 128;

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 200;
