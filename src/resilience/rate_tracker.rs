//! Adaptive per-model request pacing.
//!
//! Each model id owns a pacing record holding a base delay (from
//! configuration) and a current delay that grows on quota errors and drifts
//! back toward base after sustained success:
//!
//! - `mark_error_429`: `current = min(cap * base, max(backoff * current, retry hint))`
//! - `mark_success`: every `threshold` consecutive successes halve `current - base`
//!
//! Invariant: `base <= current <= cap * base`, and `is_adapted == (current != base)`.
//!
//! Adapted delays are written to a [`KeyValueStore`] on every change as a JSON
//! map `{model_id: current_delay_ms}` and merged back on construction.

use super::store::KeyValueStore;
use crate::config::RelayConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Storage key of the persisted `{model_id: current_delay_ms}` map.
pub const ADAPTIVE_DELAYS_KEY: &str = "adaptive_delays";

static RETRY_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)retry in\s+(\d+(?:\.\d+)?)\s*s(?:ec(?:ond)?s?)?\b")
        .expect("retry-in pattern is valid")
});

/// Pacing constants and per-model base delays.
#[derive(Debug, Clone)]
pub struct RateTrackerConfig {
    pub default_delay_ms: u64,
    pub generation_estimate_ms: u64,
    pub success_streak_threshold: u32,
    pub backoff_multiplier: u64,
    pub max_delay_multiplier: u64,
    pub base_delays: HashMap<String, u64>,
}

impl RateTrackerConfig {
    pub fn new() -> Self {
        Self {
            default_delay_ms: 1000,
            generation_estimate_ms: 2000,
            success_streak_threshold: 3,
            backoff_multiplier: 2,
            max_delay_multiplier: 5,
            base_delays: HashMap::new(),
        }
    }

    pub fn from_relay_config(config: &RelayConfig) -> Self {
        let d = &config.defaults;
        let base_delays = config
            .models
            .iter()
            .filter_map(|(id, m)| m.base_delay_ms().map(|ms| (id.clone(), ms)))
            .collect();
        Self {
            default_delay_ms: d.default_delay_ms,
            generation_estimate_ms: d.generation_estimate_ms,
            success_streak_threshold: d.success_streak_threshold.max(1),
            backoff_multiplier: d.backoff_multiplier.max(1),
            max_delay_multiplier: d.max_delay_multiplier.max(1),
            base_delays,
        }
    }

    pub fn with_base_delay(mut self, model: impl Into<String>, ms: u64) -> Self {
        self.base_delays.insert(model.into(), ms);
        self
    }

    pub fn with_default_delay(mut self, ms: u64) -> Self {
        self.default_delay_ms = ms;
        self
    }

    pub fn with_success_streak_threshold(mut self, n: u32) -> Self {
        self.success_streak_threshold = n.max(1);
        self
    }
}

impl Default for RateTrackerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct RateState {
    base_delay_ms: u64,
    current_delay_ms: u64,
    /// Start of the most recent (or reserved) request slot.
    last_request_at: Option<Instant>,
    success_streak: u32,
    is_adapted: bool,
}

impl RateState {
    fn new(base_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            current_delay_ms: base_delay_ms,
            last_request_at: None,
            success_streak: 0,
            is_adapted: false,
        }
    }

    fn set_current(&mut self, ms: u64) {
        self.current_delay_ms = ms;
        self.is_adapted = ms != self.base_delay_ms;
    }
}

/// Public view of one model's pacing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStats {
    pub model: String,
    pub base_delay_ms: u64,
    pub current_delay_ms: u64,
    pub success_streak: u32,
    pub is_adapted: bool,
}

/// Projected duration of a run of `n` sequential generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEstimate {
    pub total_ms: u64,
    pub per_item_ms: u64,
    pub delay_ms: u64,
}

/// Process-wide adaptive pacing service. Construct once, share via `Arc`.
pub struct RateTracker {
    cfg: RateTrackerConfig,
    states: Mutex<HashMap<String, RateState>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl std::fmt::Debug for RateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateTracker")
            .field("cfg", &self.cfg)
            .field("store", &self.store.as_ref().map(|s| s.name()))
            .finish()
    }
}

impl RateTracker {
    /// Tracker without persistence.
    pub fn new(cfg: RateTrackerConfig) -> Self {
        Self {
            cfg,
            states: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Tracker backed by `store`; previously persisted delays are merged in.
    pub fn with_store(cfg: RateTrackerConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let tracker = Self {
            cfg,
            states: Mutex::new(HashMap::new()),
            store: Some(store),
        };
        tracker.load_persisted();
        tracker
    }

    pub fn config(&self) -> &RateTrackerConfig {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RateState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cap_for(&self, base: u64) -> u64 {
        base.saturating_mul(self.cfg.max_delay_multiplier)
    }

    fn state_entry<'a>(
        &self,
        states: &'a mut HashMap<String, RateState>,
        model: &str,
    ) -> &'a mut RateState {
        states
            .entry(model.to_string())
            .or_insert_with(|| RateState::new(self.get_base_delay(model)))
    }

    /// Configured base delay, ignoring adaptation.
    pub fn get_base_delay(&self, model: &str) -> u64 {
        self.cfg
            .base_delays
            .get(model)
            .copied()
            .unwrap_or(self.cfg.default_delay_ms)
    }

    /// Current spacing between two requests to `model`.
    pub fn get_delay(&self, model: &str) -> u64 {
        match self.lock().get(model) {
            Some(state) => state.current_delay_ms,
            None => self.get_base_delay(model),
        }
    }

    fn wait_duration(&self, model: &str) -> Duration {
        let states = self.lock();
        let Some(state) = states.get(model) else {
            return Duration::ZERO;
        };
        match state.last_request_at {
            Some(last) => (last + Duration::from_millis(state.current_delay_ms))
                .saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    /// Milliseconds until `model` may be called again; 0 when it may go now.
    pub fn get_wait_time(&self, model: &str) -> u64 {
        self.wait_duration(model).as_millis() as u64
    }

    /// Sleep until `model`'s next slot and claim it.
    pub async fn wait_if_needed(&self, model: &str) {
        self.wait_if_needed_with(model, |_| {}).await;
    }

    /// Like [`wait_if_needed`](Self::wait_if_needed), calling `on_wait(wait_ms)`
    /// before sleeping when a wait is required.
    ///
    /// The slot is reserved under the lock before sleeping, so concurrent
    /// callers for the same model queue up one delay apart instead of racing.
    pub async fn wait_if_needed_with<F>(&self, model: &str, on_wait: F)
    where
        F: FnOnce(u64),
    {
        let wait = {
            let mut states = self.lock();
            let now = Instant::now();
            let state = self.state_entry(&mut states, model);
            let wait = match state.last_request_at {
                Some(last) => (last + Duration::from_millis(state.current_delay_ms))
                    .saturating_duration_since(now),
                None => Duration::ZERO,
            };
            state.last_request_at = Some(now + wait);
            wait
        };

        if !wait.is_zero() {
            let wait_ms = wait.as_millis() as u64;
            debug!(model, wait_ms, "waiting for rate limit slot");
            on_wait(wait_ms);
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a successful call; may move the delay back toward base.
    pub fn mark_success(&self, model: &str) {
        let threshold = self.cfg.success_streak_threshold;
        let changed = {
            let mut states = self.lock();
            let state = self.state_entry(&mut states, model);
            state.success_streak += 1;
            if state.success_streak < threshold {
                false
            } else {
                state.success_streak = 0;
                if state.current_delay_ms > state.base_delay_ms {
                    let previous = state.current_delay_ms;
                    let next =
                        state.base_delay_ms + (state.current_delay_ms - state.base_delay_ms) / 2;
                    state.set_current(next);
                    info!(model, from_ms = previous, to_ms = next, "adaptive delay recovering");
                    true
                } else {
                    false
                }
            }
        };
        if changed {
            self.persist();
        }
    }

    /// Record a quota/rate-limit failure and lengthen the delay.
    pub fn mark_error_429(&self, model: &str, raw_message: &str) {
        let suggested = extract_retry_after(raw_message).unwrap_or(0);
        {
            let mut states = self.lock();
            let backoff = self.cfg.backoff_multiplier;
            let base = self.get_base_delay(model);
            let cap = self.cap_for(base);
            let state = self.state_entry(&mut states, model);
            let previous = state.current_delay_ms;
            let next = state
                .current_delay_ms
                .saturating_mul(backoff)
                .max(suggested)
                .min(cap)
                .max(state.base_delay_ms);
            state.success_streak = 0;
            state.set_current(next);
            warn!(
                model,
                from_ms = previous,
                to_ms = next,
                suggested_ms = suggested,
                "quota error, backing off"
            );
        }
        self.persist();
    }

    /// Snapshot of one model's state (configured values when never seen).
    pub fn get_stats(&self, model: &str) -> RateStats {
        let state = self
            .lock()
            .get(model)
            .copied()
            .unwrap_or_else(|| RateState::new(self.get_base_delay(model)));
        RateStats {
            model: model.to_string(),
            base_delay_ms: state.base_delay_ms,
            current_delay_ms: state.current_delay_ms,
            success_streak: state.success_streak,
            is_adapted: state.is_adapted,
        }
    }

    pub fn estimate_time(&self, n: u64, model: &str) -> TimeEstimate {
        let delay_ms = self.get_delay(model);
        let per_item_ms = delay_ms + self.cfg.generation_estimate_ms;
        TimeEstimate {
            total_ms: n.saturating_mul(per_item_ms),
            per_item_ms,
            delay_ms,
        }
    }

    /// Return one model (or all when `None`) to base delay with a clean streak.
    pub fn reset(&self, model: Option<&str>) {
        self.apply_reset(model, true);
    }

    /// Drop adaptation only; success streaks are kept.
    pub fn reset_adaptive_delays(&self, model: Option<&str>) {
        self.apply_reset(model, false);
    }

    fn apply_reset(&self, model: Option<&str>, clear_streak: bool) {
        {
            let mut states = self.lock();
            let reset_one = |state: &mut RateState| {
                state.set_current(state.base_delay_ms);
                if clear_streak {
                    state.success_streak = 0;
                }
            };
            match model {
                Some(m) => {
                    if let Some(state) = states.get_mut(m) {
                        reset_one(state);
                    }
                }
                None => states.values_mut().for_each(reset_one),
            }
        }
        info!(model = model.unwrap_or("*"), clear_streak, "rate state reset");
        self.persist();
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let adapted: BTreeMap<String, u64> = self
            .lock()
            .iter()
            .filter(|(_, s)| s.is_adapted)
            .map(|(id, s)| (id.clone(), s.current_delay_ms))
            .collect();

        let result = if adapted.is_empty() {
            store.remove(ADAPTIVE_DELAYS_KEY).map(|_| ())
        } else {
            serde_json::to_string(&adapted)
                .map_err(crate::Error::from)
                .and_then(|json| store.set(ADAPTIVE_DELAYS_KEY, &json))
        };
        if let Err(e) = result {
            warn!(store = store.name(), error = %e, "failed to persist adaptive delays");
        }
    }

    fn load_persisted(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let raw = match store.get(ADAPTIVE_DELAYS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!(store = store.name(), error = %e, "failed to load adaptive delays");
                return;
            }
        };
        let saved: HashMap<String, u64> = match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "ignoring corrupt adaptive delay map");
                return;
            }
        };

        let mut states = self.lock();
        for (model, delay) in saved {
            let base = self.get_base_delay(&model);
            let state = self.state_entry(&mut states, &model);
            state.set_current(delay.clamp(base, self.cap_for(base)));
        }
        debug!(models = states.len(), "restored adaptive delays");
    }
}

/// Parse a "retry in <seconds>s" hint (case-insensitive, decimals allowed).
///
/// The unit may be written `s`, `sec`, `secs`, `second` or `seconds`, and must
/// end at a word boundary (`"retry in 2s3"` is not a hint). Half a second of
/// margin is added: `round((seconds + 0.5) * 1000)`.
pub fn extract_retry_after(message: &str) -> Option<u64> {
    let caps = RETRY_IN.captures(message)?;
    let secs: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(((secs + 0.5) * 1000.0).round() as u64)
}

/// Humanize a duration, rounding up to the second: `"45 sec"`, `"1 min 30 sec"`, `"2 min"`.
pub fn format_time(ms: u64) -> String {
    let secs = ms.div_ceil(1000);
    if secs < 60 {
        return format!("{} sec", secs);
    }
    let (min, sec) = (secs / 60, secs % 60);
    if sec == 0 {
        format!("{} min", min)
    } else {
        format!("{} min {} sec", min, sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::store::MemoryStore;

    fn tracker() -> RateTracker {
        RateTracker::new(
            RateTrackerConfig::new()
                .with_default_delay(1000)
                .with_base_delay("model-a", 500)
                .with_base_delay("model-b", 800),
        )
    }

    #[test]
    fn test_get_delay_defaults() {
        let t = tracker();
        assert_eq!(t.get_delay("model-a"), 500);
        assert_eq!(t.get_delay("unknown"), 1000);
        assert_eq!(t.get_base_delay("unknown"), 1000);
    }

    #[test]
    fn test_extract_retry_after() {
        assert_eq!(extract_retry_after("Please retry in 3.5s"), Some(4000));
        assert_eq!(extract_retry_after("Rate limit. Retry in 10s"), Some(10500));
        assert_eq!(extract_retry_after("retry in 1.5s please"), Some(2000));
        assert_eq!(extract_retry_after("RETRY IN 2 seconds"), Some(2500));
        assert_eq!(extract_retry_after("retry in 4 sec."), Some(4500));
        assert_eq!(extract_retry_after("retry in 2s3"), None);
        assert_eq!(extract_retry_after("Erreur générique"), None);
        assert_eq!(extract_retry_after(""), None);
        assert_eq!(extract_retry_after("retry in soon"), None);
    }

    #[test]
    fn test_error_429_doubles_delay() {
        let t = tracker();
        t.mark_error_429("model-a", "");
        assert_eq!(t.get_delay("model-a"), 1000);
        assert!(t.get_stats("model-a").is_adapted);
    }

    #[test]
    fn test_error_429_respects_cap() {
        let t = tracker();
        t.mark_error_429("model-a", "Rate limit exceeded. Please retry in 5.5s");
        // suggested 6000 ms, capped at 5 x 500
        assert_eq!(t.get_delay("model-a"), 2500);
        t.mark_error_429("model-a", "");
        assert_eq!(t.get_delay("model-a"), 2500);
    }

    #[test]
    fn test_error_429_uses_retry_hint_when_larger() {
        let t = tracker();
        t.mark_error_429("model-b", "retry in 1.9s");
        // max(1600, 2400) under cap 4000
        assert_eq!(t.get_delay("model-b"), 2400);
    }

    #[test]
    fn test_error_429_resets_streak() {
        let t = tracker();
        t.mark_success("model-a");
        t.mark_success("model-a");
        assert_eq!(t.get_stats("model-a").success_streak, 2);
        t.mark_error_429("model-a", "");
        assert_eq!(t.get_stats("model-a").success_streak, 0);
    }

    #[test]
    fn test_success_streak_recovers_delay() {
        let t = tracker();
        t.mark_error_429("model-a", "");
        t.mark_error_429("model-a", "");
        let adapted = t.get_delay("model-a");
        assert_eq!(adapted, 2000);

        t.mark_success("model-a");
        t.mark_success("model-a");
        assert_eq!(t.get_delay("model-a"), adapted);
        t.mark_success("model-a");
        let recovered = t.get_delay("model-a");
        assert!(recovered < adapted);
        assert_eq!(recovered, 1250);
        assert_eq!(t.get_stats("model-a").success_streak, 0);
    }

    #[test]
    fn test_recovery_converges_to_base() {
        let t = tracker();
        t.mark_error_429("model-a", "");
        for _ in 0..60 {
            t.mark_success("model-a");
        }
        let stats = t.get_stats("model-a");
        assert_eq!(stats.current_delay_ms, 500);
        assert!(!stats.is_adapted);
    }

    #[test]
    fn test_success_without_adaptation_keeps_base() {
        let t = tracker();
        for _ in 0..3 {
            t.mark_success("model-a");
        }
        assert_eq!(t.get_delay("model-a"), 500);
        assert!(!t.get_stats("model-a").is_adapted);
    }

    #[tokio::test]
    async fn test_wait_time_lifecycle() {
        let t = RateTracker::new(RateTrackerConfig::new().with_base_delay("fast", 60));
        assert_eq!(t.get_wait_time("fast"), 0);

        t.wait_if_needed("fast").await;
        let first = t.get_wait_time("fast");
        assert!(first > 0);
        assert!(first <= t.get_delay("fast"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(t.get_wait_time("fast") < first);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(t.get_wait_time("fast"), 0);
    }

    #[tokio::test]
    async fn test_wait_if_needed_reports_and_sleeps() {
        let t = RateTracker::new(RateTrackerConfig::new().with_base_delay("fast", 40));
        let mut reported = None;
        t.wait_if_needed_with("fast", |ms| reported = Some(ms)).await;
        assert_eq!(reported, None);

        let start = Instant::now();
        t.wait_if_needed_with("fast", |ms| reported = Some(ms)).await;
        assert!(reported.is_some_and(|ms| ms > 0 && ms <= 40));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_estimate_time() {
        let t = tracker();
        let est = t.estimate_time(10, "model-a");
        assert_eq!(est.delay_ms, 500);
        assert_eq!(est.per_item_ms, 2500);
        assert_eq!(est.total_ms, 25_000);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(5000), "5 sec");
        assert_eq!(format_time(4500), "5 sec");
        assert_eq!(format_time(90_000), "1 min 30 sec");
        assert_eq!(format_time(120_000), "2 min");
        assert_eq!(format_time(59_001), "1 min");
        assert_eq!(format_time(0), "0 sec");
    }

    #[test]
    fn test_reset_single_model() {
        let t = tracker();
        t.mark_error_429("model-a", "");
        t.mark_error_429("model-b", "");
        t.reset(Some("model-a"));
        assert_eq!(t.get_delay("model-a"), 500);
        assert!(!t.get_stats("model-a").is_adapted);
        assert_eq!(t.get_delay("model-b"), 1600);
    }

    #[test]
    fn test_reset_all_models() {
        let t = tracker();
        t.mark_error_429("model-a", "");
        t.mark_error_429("model-b", "");
        t.reset(None);
        assert_eq!(t.get_delay("model-a"), 500);
        assert_eq!(t.get_delay("model-b"), 800);
    }

    #[test]
    fn test_reset_adaptive_delays_keeps_streak() {
        let t = tracker();
        t.mark_error_429("model-a", "");
        t.mark_success("model-a");
        t.reset_adaptive_delays(Some("model-a"));
        let stats = t.get_stats("model-a");
        assert_eq!(stats.current_delay_ms, 500);
        assert_eq!(stats.success_streak, 1);

        t.reset(Some("model-a"));
        assert_eq!(t.get_stats("model-a").success_streak, 0);
    }

    #[test]
    fn test_persists_and_restores_delays() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let cfg = RateTrackerConfig::new().with_base_delay("model-a", 500);

        let first = RateTracker::with_store(cfg.clone(), store.clone());
        first.mark_error_429("model-a", "");
        first.mark_success("model-a");
        assert_eq!(
            store.get(ADAPTIVE_DELAYS_KEY).unwrap().as_deref(),
            Some(r#"{"model-a":1000}"#)
        );

        let second = RateTracker::with_store(cfg, store.clone());
        let stats = second.get_stats("model-a");
        assert_eq!(stats.current_delay_ms, 1000);
        assert!(stats.is_adapted);
        // streaks are not persisted
        assert_eq!(stats.success_streak, 0);

        second.reset(None);
        assert_eq!(store.get(ADAPTIVE_DELAYS_KEY).unwrap(), None);
    }

    #[test]
    fn test_restored_delay_is_clamped() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store
            .set(ADAPTIVE_DELAYS_KEY, r#"{"model-a":99999,"model-b":1}"#)
            .unwrap();
        let t = RateTracker::with_store(
            RateTrackerConfig::new()
                .with_base_delay("model-a", 500)
                .with_base_delay("model-b", 800),
            store,
        );
        assert_eq!(t.get_delay("model-a"), 2500);
        assert_eq!(t.get_delay("model-b"), 800);
    }

    #[test]
    fn test_corrupt_persisted_map_is_ignored() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(ADAPTIVE_DELAYS_KEY, "not json").unwrap();
        let t = RateTracker::with_store(RateTrackerConfig::new(), store);
        assert_eq!(t.get_delay("anything"), 1000);
    }
}
