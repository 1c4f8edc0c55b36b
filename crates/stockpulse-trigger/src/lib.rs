//! Trigger source adapters for the stockpulse dispatcher.
//!
//! - [`NativeBridgeSource`]: JSON payloads pushed by the host platform's
//!   trigger service (live ticks and replayed background ticks).
//! - [`IntervalFallbackSource`]: in-process timer that reproduces the
//!   multi-interval schedule when no native service is available.
//!
//! # Payload format
//!
//! ```json
//! {"timestamp":1700000000000,"interval":"5min","interval_count":3,
//!  "total_minutes":15,"current_time":1700000000000}
//! ```
//!
//! Background deliveries add `"source":"workmanager"` and, when they were
//! queued while the app was inactive, `"stored_at":<epoch ms>`.

pub mod interval;
pub mod native;

pub use interval::{IntervalFallbackSource, triggers_for_minute};
pub use native::NativeBridgeSource;
