use crate::error_code::ErrorClassification;
use crate::tokens::UsageRecord;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One model the orchestrator may dispatch to. Immutable per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub model_id: String,
    pub provider_id: String,
    pub has_credential: bool,
}

impl Candidate {
    pub fn new(model_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            provider_id: provider_id.into(),
            has_credential: true,
        }
    }

    pub fn without_credential(mut self) -> Self {
        self.has_credential = false;
        self
    }
}

/// Caller options for one `generate` call.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Model tried first. Defaults to the orchestrator's selected model.
    pub model: Option<String>,
    /// Cancelling the token ends the whole call with `Cancelled`.
    pub cancel: Option<CancellationToken>,
    /// Free-form label echoed in lifecycle events (e.g. "appreciation").
    pub context: Option<String>,
    /// Display hint echoed in lifecycle events (e.g. the student's name).
    pub name_hint: Option<String>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_name_hint(mut self, name_hint: impl Into<String>) -> Self {
        self.name_hint = Some(name_hint.into());
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Successful result of `generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub usage: UsageRecord,
    pub model_used: String,
}

/// Result of one dispatch to one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        text: String,
        usage: UsageRecord,
        generation_time_ms: u64,
    },
    Failure {
        classification: ErrorClassification,
        /// Vendor or local detail; kept for logs and retry-hint parsing.
        message: String,
    },
}

impl Outcome {
    pub fn failure(classification: ErrorClassification, message: impl Into<String>) -> Self {
        Self::Failure {
            classification,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn classification(&self) -> Option<ErrorClassification> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { classification, .. } => Some(*classification),
        }
    }
}

/// Per-dispatch limits handed to the executor.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub timeout: Duration,
    pub cancel: Option<CancellationToken>,
}

impl ExecuteOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }
}
