//! bookline: a booking engine for provider schedules.
//!
//! Bookings tie a client to a provider for a half-open time window and move
//! through a fixed status table (scheduled, in progress, completed,
//! cancelled, rescheduled). Each provider's time is guarded by its own slot
//! ledger, so availability checks and reservations happen atomically under
//! one lock and double-booking cannot slip through between them. Records
//! are never deleted: cancellation and reschedule are transitions, and
//! reads stay cheap through a TTL cache that mutations invalidate.
//!
//! [`Engine`] is the entry point. Wire it to your own [`store::BookingStore`]
//! and cache backend, or start fully in-process:
//!
//! ```no_run
//! use bookline::config::EngineConfig;
//! use bookline::Engine;
//!
//! # async fn run() {
//! let engine = Engine::in_memory(&EngineConfig::from_env());
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod store;
pub mod sweeper;

pub use engine::{Engine, EngineError};
