//! Request pacing and durable scheduler state.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_tracker`] | Adaptive per-model delays, quota backoff and recovery |
//! | [`store`] | Key/value persistence for adapted delays |
//!
//! ```rust
//! use ai_relay::resilience::rate_tracker::{format_time, RateTracker, RateTrackerConfig};
//!
//! let tracker = RateTracker::new(RateTrackerConfig::new().with_base_delay("gemini-2.0-flash", 500));
//! tracker.mark_error_429("gemini-2.0-flash", "Quota exceeded. Please retry in 1.2s");
//! assert_eq!(tracker.get_delay("gemini-2.0-flash"), 1700);
//!
//! let estimate = tracker.estimate_time(30, "gemini-2.0-flash");
//! assert_eq!(format_time(estimate.total_ms), "1 min 51 sec");
//! ```

pub mod rate_tracker;
pub mod store;

pub use rate_tracker::{
    extract_retry_after, format_time, RateStats, RateTracker, RateTrackerConfig, TimeEstimate,
    ADAPTIVE_DELAYS_KEY,
};
pub use store::{FileStore, KeyValueStore, MemoryStore};
