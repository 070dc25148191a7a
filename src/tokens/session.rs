//! Process-wide usage accumulator.

use super::pricing::{CostEstimate, ModelPricing};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Token counts and timing of one successful generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub generation_time_ms: u64,
}

impl UsageRecord {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, generation_time_ms: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            generation_time_ms,
        }
    }
}

/// Running totals since the accumulator was created or last reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub requests: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost: f64,
}

impl SessionSnapshot {
    pub fn format_cost(&self) -> String {
        if self.estimated_cost < 0.01 {
            format!("${:.4}", self.estimated_cost)
        } else {
            format!("${:.2}", self.estimated_cost)
        }
    }
}

/// Shared accumulator; one per relay, handed around by `Arc`.
#[derive(Debug, Default)]
pub struct SessionUsage {
    totals: Mutex<SessionSnapshot>,
}

impl SessionUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one successful call into the totals and return its cost.
    pub fn record(&self, usage: &UsageRecord, pricing: &ModelPricing) -> CostEstimate {
        let cost = pricing.calculate_cost(usage.prompt_tokens, usage.completion_tokens);
        let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        totals.requests = totals.requests.saturating_add(1);
        totals.prompt_tokens = totals.prompt_tokens.saturating_add(usage.prompt_tokens);
        totals.completion_tokens = totals.completion_tokens.saturating_add(usage.completion_tokens);
        totals.total_tokens = totals.total_tokens.saturating_add(usage.total_tokens);
        totals.estimated_cost += cost.total_cost;
        cost
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.totals.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn reset(&self) {
        *self.totals.lock().unwrap_or_else(|e| e.into_inner()) = SessionSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_tokens_and_cost() {
        let session = SessionUsage::new();
        let pricing = ModelPricing::new("gpt-4o", 0.0025, 0.01);

        session.record(&UsageRecord::new(1000, 500, 1200), &pricing);
        let cost = session.record(&UsageRecord::new(2000, 1000, 900), &pricing);
        assert!((cost.total_cost - 0.015).abs() < 1e-12);

        let snap = session.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.prompt_tokens, 3000);
        assert_eq!(snap.completion_tokens, 1500);
        assert_eq!(snap.total_tokens, 4500);
        assert!((snap.estimated_cost - 0.0225).abs() < 1e-12);
    }

    #[test]
    fn test_format_cost() {
        let mut snap = SessionSnapshot::default();
        snap.estimated_cost = 0.0012;
        assert_eq!(snap.format_cost(), "$0.0012");
        snap.estimated_cost = 0.5;
        assert_eq!(snap.format_cost(), "$0.50");
    }

    #[test]
    fn test_oversized_counts_saturate() {
        let usage = UsageRecord::new(u64::MAX, 5, 0);
        assert_eq!(usage.total_tokens, u64::MAX);

        let session = SessionUsage::new();
        let pricing = ModelPricing::free("llama3.1");
        session.record(&usage, &pricing);
        session.record(&usage, &pricing);
        let snap = session.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.prompt_tokens, u64::MAX);
        assert_eq!(snap.completion_tokens, 10);
        assert_eq!(snap.total_tokens, u64::MAX);
    }

    #[test]
    fn test_reset_clears_totals() {
        let session = SessionUsage::new();
        session.record(&UsageRecord::new(10, 10, 5), &ModelPricing::free("llama3.1"));
        session.reset();
        assert_eq!(session.snapshot(), SessionSnapshot::default());
    }
}
