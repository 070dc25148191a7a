//! Per-call attempt log and the aggregate error built from it.

use super::types::Candidate;
use crate::error::ExhaustedError;
use crate::error_code::ErrorClassification;
use crate::resilience::extract_retry_after;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub candidate: Candidate,
    pub classification: ErrorClassification,
    pub message: String,
}

/// Ordered failures of one `generate` call.
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    attempts: Vec<Attempt>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        candidate: Candidate,
        classification: ErrorClassification,
        message: impl Into<String>,
    ) {
        self.attempts.push(Attempt {
            candidate,
            classification,
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn first(&self) -> Option<&Attempt> {
        self.attempts.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter()
    }

    /// Most frequent classification; ties go to the one seen first.
    pub fn dominant(&self) -> Option<ErrorClassification> {
        let mut best: Option<(ErrorClassification, usize)> = None;
        for attempt in &self.attempts {
            let c = attempt.classification;
            let count = self.attempts.iter().filter(|a| a.classification == c).count();
            if best.map_or(true, |(_, n)| count > n) {
                best = Some((c, count));
            }
        }
        best.map(|(c, _)| c)
    }

    /// Largest retry hint among quota failures.
    pub fn max_retry_after_ms(&self) -> Option<u64> {
        self.attempts
            .iter()
            .filter(|a| a.classification == ErrorClassification::Quota)
            .filter_map(|a| extract_retry_after(&a.message))
            .max()
    }

    pub fn into_exhausted(self, skipped: usize) -> ExhaustedError {
        ExhaustedError {
            dominant: self.dominant().unwrap_or(ErrorClassification::Unknown),
            quota_limited: self
                .attempts
                .iter()
                .filter(|a| a.classification == ErrorClassification::Quota)
                .count(),
            retry_after_ms: self.max_retry_after_ms(),
            attempted: self
                .attempts
                .into_iter()
                .map(|a| a.candidate.model_id)
                .collect(),
            skipped,
        }
    }
}
