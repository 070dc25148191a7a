//! Multi-candidate fallback loop.

use super::attempts::AttemptLog;
use super::candidates::CandidateQueue;
use super::executor::CandidateExecutor;
use super::types::{Candidate, ExecuteOptions, GenerateOptions, Generation, Outcome};
use crate::config::RelayConfig;
use crate::error_code::ErrorClassification;
use crate::resilience::RateTracker;
use crate::telemetry::{EventSink, GenerationEvent, GenerationOutcome};
use crate::transport::CredentialSource;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Drives one prompt across the candidate queue.
///
/// Per candidate: take the model's lock, wait for its rate slot, dispatch.
/// Success ends the call; `Auth` and `Cancelled` abort it; every other
/// failure advances to the next candidate. `generation-end` is emitted on
/// every exit path.
pub struct FallbackOrchestrator {
    config: Arc<RelayConfig>,
    tracker: Arc<RateTracker>,
    executor: Arc<dyn CandidateExecutor>,
    credentials: Arc<dyn CredentialSource>,
    events: Arc<dyn EventSink>,
    selected_model: Mutex<String>,
    model_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for FallbackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackOrchestrator")
            .field("tracker", &self.tracker)
            .field("selected_model", &self.selected_model())
            .finish()
    }
}

impl FallbackOrchestrator {
    pub fn new(
        config: Arc<RelayConfig>,
        tracker: Arc<RateTracker>,
        executor: Arc<dyn CandidateExecutor>,
        credentials: Arc<dyn CredentialSource>,
        events: Arc<dyn EventSink>,
        selected_model: impl Into<String>,
    ) -> Self {
        Self {
            config,
            tracker,
            executor,
            credentials,
            events,
            selected_model: Mutex::new(selected_model.into()),
            model_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracker(&self) -> &Arc<RateTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Model tried first when a call does not name one.
    pub fn selected_model(&self) -> String {
        self.selected_model
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_selected_model(&self, model: impl Into<String>) {
        *self.selected_model.lock().unwrap_or_else(|e| e.into_inner()) = model.into();
    }

    /// Queue a call would use right now, without dispatching anything.
    pub fn candidate_queue(&self, selected: &str) -> CandidateQueue {
        CandidateQueue::build(&self.config, selected, self.credentials.as_ref())
    }

    fn model_lock(&self, model: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.model_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(model.to_string())
            .or_default()
            .clone()
    }

    pub async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<Generation> {
        self.events.emit(GenerationEvent::Started {
            context: options.context.clone(),
            name_hint: options.name_hint.clone(),
        });

        let result = self.run(prompt, &options).await;

        self.events.emit(GenerationEvent::Finished {
            context: options.context.clone(),
            name_hint: options.name_hint.clone(),
            outcome: if result.is_ok() {
                GenerationOutcome::Succeeded
            } else {
                GenerationOutcome::Failed
            },
        });
        result
    }

    /// Run prompts one after another. Stops after the first cancelled item;
    /// other failures are recorded and the batch continues.
    pub async fn generate_batch<S: AsRef<str>>(
        &self,
        prompts: &[S],
        options: GenerateOptions,
    ) -> Vec<Result<Generation>> {
        let mut results = Vec::with_capacity(prompts.len());
        for (idx, prompt) in prompts.iter().enumerate() {
            let result = self.generate(prompt.as_ref(), options.clone()).await;
            let cancelled = matches!(&result, Err(e) if e.is_cancelled());
            results.push(result);
            if cancelled {
                info!(completed = idx + 1, total = prompts.len(), "batch cancelled");
                break;
            }
        }
        results
    }

    async fn run(&self, prompt: &str, options: &GenerateOptions) -> Result<Generation> {
        let selected = options
            .model
            .clone()
            .unwrap_or_else(|| self.selected_model());
        let queue = self.candidate_queue(&selected);
        if queue.is_empty() {
            warn!(
                model = %selected,
                skipped = queue.skipped.len(),
                "no candidate has a credential"
            );
            return Err(Error::NoCredentials {
                skipped: queue.skipped.len(),
            });
        }

        let mut log = AttemptLog::new();
        for candidate in &queue.candidates {
            let outcome = self.dispatch(candidate, prompt, options).await;
            match outcome {
                Outcome::Success { text, usage, .. } => {
                    self.tracker.mark_success(&candidate.model_id);
                    if let Some(first) = log.first() {
                        info!(
                            original_model = %first.candidate.model_id,
                            used_model = %candidate.model_id,
                            reason = %first.classification,
                            "fallback succeeded"
                        );
                        self.events.emit(GenerationEvent::FallbackOccurred {
                            original_model: first.candidate.model_id.clone(),
                            used_model: candidate.model_id.clone(),
                            reason: first.classification.to_string(),
                        });
                    }
                    return Ok(Generation {
                        text,
                        usage,
                        model_used: candidate.model_id.clone(),
                    });
                }
                Outcome::Failure {
                    classification,
                    message,
                } => {
                    if classification.feeds_backoff() {
                        self.tracker.mark_error_429(&candidate.model_id, &message);
                    }
                    if classification.is_terminal() {
                        warn!(
                            model = %candidate.model_id,
                            classification = %classification,
                            "terminal failure, not trying other candidates"
                        );
                        return Err(Error::Aborted {
                            classification,
                            model: candidate.model_id.clone(),
                            detail: message,
                        });
                    }
                    log.push(candidate.clone(), classification, message);
                }
            }
        }

        let exhausted = log.into_exhausted(queue.skipped.len());
        error!(
            attempted = exhausted.attempted.len(),
            skipped = exhausted.skipped,
            dominant = %exhausted.dominant,
            quota_limited = exhausted.quota_limited,
            "all candidates failed"
        );
        Err(Error::Exhausted(exhausted))
    }

    /// Serialize on the model, wait for its slot, then execute. Cancellation
    /// is honored while queued or sleeping, not only during the call.
    async fn dispatch(&self, candidate: &Candidate, prompt: &str, options: &GenerateOptions) -> Outcome {
        if options.is_cancelled() {
            return Outcome::failure(ErrorClassification::Cancelled, "cancelled before dispatch");
        }
        let model = candidate.model_id.as_str();
        let lock = self.model_lock(model);
        let execute_options = ExecuteOptions::new(self.config.timeout_for(&candidate.provider_id))
            .with_cancel(options.cancel.clone());

        let attempt = async {
            let _guard = lock.lock().await;
            self.tracker
                .wait_if_needed_with(model, |wait_ms| {
                    self.events.emit(GenerationEvent::RateLimitWait {
                        model: model.to_string(),
                        wait_ms,
                    })
                })
                .await;
            self.executor.execute(candidate, prompt, &execute_options).await
        };

        match &options.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    Outcome::failure(ErrorClassification::Cancelled, "cancelled while waiting")
                }
                outcome = attempt => outcome,
            },
            None => attempt.await,
        }
    }
}
