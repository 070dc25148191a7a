use crate::error_code::ErrorClassification;
use std::fmt;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "providers.gemini.base_url")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "file_store")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Aggregate failure produced when every candidate was tried and none succeeded.
///
/// The rendered message is meant for end users: it names how many candidates
/// were tried and what went wrong, but never carries raw vendor payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExhaustedError {
    /// Model ids in the order they were attempted.
    pub attempted: Vec<String>,
    /// Candidates dropped before dispatch because their provider had no credential.
    pub skipped: usize,
    /// Most frequent classification among the attempts.
    pub dominant: ErrorClassification,
    /// Attempts that failed on quota.
    pub quota_limited: usize,
    /// Largest retry hint seen among quota failures, when any was given.
    pub retry_after_ms: Option<u64>,
}

impl fmt::Display for ExhaustedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.attempted.len();
        if self.dominant == ErrorClassification::Quota {
            if self.quota_limited >= n {
                write!(f, "all {} model(s) tried are quota-limited", n)?;
            } else {
                write!(f, "{} of {} model(s) tried are quota-limited", self.quota_limited, n)?;
            }
            match self.retry_after_ms {
                Some(ms) => write!(f, "; retry in ~{} s", ms.div_ceil(1000))?,
                None => write!(f, "; retry in a moment")?,
            }
            write!(f, ". Add a fallback provider to keep generating")?;
        } else {
            write!(
                f,
                "{} model(s) tried, none available ({}): {}",
                n,
                self.dominant.describe(),
                self.attempted.join(", ")
            )?;
        }
        if self.skipped > 0 {
            write!(f, " ({} skipped: no credential)", self.skipped)?;
        }
        Ok(())
    }
}

/// Unified error type for the relay.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Storage error: {message}{}", format_context(.context))]
    Storage {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A terminal classification (`Auth` or `Cancelled`) stopped the call.
    /// `detail` keeps the raw provider text for logs and is not displayed.
    #[error("Generation aborted on {model}: {}", .classification.describe())]
    Aborted {
        classification: ErrorClassification,
        model: String,
        detail: String,
    },

    #[error("No credentials configured: {skipped} candidate model(s) skipped. Configure an API key for at least one provider")]
    NoCredentials { skipped: usize },

    #[error("Generation failed: {0}")]
    Exhausted(ExhaustedError),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new storage error with structured context
    pub fn storage_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Storage {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Storage { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Classification of a generation failure.
    ///
    /// `NoCredentials` maps to `Auth`; an exhausted queue reports its dominant class.
    pub fn classification(&self) -> Option<ErrorClassification> {
        match self {
            Error::Aborted { classification, .. } => Some(*classification),
            Error::NoCredentials { .. } => Some(ErrorClassification::Auth),
            Error::Exhausted(e) => Some(e.dominant),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.classification() == Some(ErrorClassification::Cancelled)
    }
}
