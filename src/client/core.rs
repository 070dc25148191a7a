use super::orchestrator::FallbackOrchestrator;
use super::types::{GenerateOptions, Generation};
use crate::resilience::{RateStats, RateTracker, TimeEstimate};
use crate::tokens::{SessionSnapshot, SessionUsage};
use crate::Result;
use std::sync::Arc;

/// Entry point for applications: the orchestrator plus the shared tracker
/// and session usage it reports into.
#[derive(Debug)]
pub struct Relay {
    pub(crate) orchestrator: FallbackOrchestrator,
    pub(crate) usage: Arc<SessionUsage>,
}

impl Relay {
    pub async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<Generation> {
        self.orchestrator.generate(prompt, options).await
    }

    pub async fn generate_batch<S: AsRef<str>>(
        &self,
        prompts: &[S],
        options: GenerateOptions,
    ) -> Vec<Result<Generation>> {
        self.orchestrator.generate_batch(prompts, options).await
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }

    pub fn tracker(&self) -> &Arc<RateTracker> {
        self.orchestrator.tracker()
    }

    pub fn selected_model(&self) -> String {
        self.orchestrator.selected_model()
    }

    pub fn set_selected_model(&self, model: impl Into<String>) {
        self.orchestrator.set_selected_model(model);
    }

    pub fn stats(&self, model: &str) -> RateStats {
        self.tracker().get_stats(model)
    }

    /// Expected duration of `n` sequential generations on `model`.
    pub fn estimate_time(&self, n: u64, model: &str) -> TimeEstimate {
        self.tracker().estimate_time(n, model)
    }

    pub fn usage(&self) -> SessionSnapshot {
        self.usage.snapshot()
    }

    pub fn reset_usage(&self) {
        self.usage.reset();
    }
}
