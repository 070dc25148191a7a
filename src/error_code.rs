//! Closed failure taxonomy shared by adapters, the executor and the orchestrator.
//!
//! Every failed attempt is reduced to exactly one [`ErrorClassification`] at the
//! provider boundary. Downstream code only ever matches on the enum.
//!
//! | Code  | Name             | Terminal | Feeds backoff |
//! |-------|------------------|----------|---------------|
//! | E1002 | `auth`           | yes      | no            |
//! | E1004 | `not_found`      | no       | no            |
//! | E2001 | `quota`          | no       | yes           |
//! | E3003 | `timeout`        | no       | no            |
//! | E3004 | `empty_response` | no       | no            |
//! | E4002 | `cancelled`      | yes      | no            |
//! | E9999 | `unknown`        | no       | no            |
//!
//! ## Example
//!
//! ```rust
//! use ai_relay::error_code::ErrorClassification;
//!
//! let class = ErrorClassification::from_http_status(429);
//! assert_eq!(class, ErrorClassification::Quota);
//! assert!(!class.is_terminal());
//! assert_eq!(class.code(), "E2001");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
    /// Invalid, expired, or missing credential.
    Auth,
    /// Rate or usage limit exceeded.
    Quota,
    /// Requested model or endpoint does not exist.
    NotFound,
    /// The per-attempt timer fired before a response arrived.
    Timeout,
    /// The caller's cancellation token fired.
    Cancelled,
    /// The provider answered successfully but produced no usable text.
    EmptyResponse,
    /// Anything else (server errors, transport failures, malformed bodies).
    Unknown,
}

impl ErrorClassification {
    /// All variants, in declaration order.
    pub const ALL: [ErrorClassification; 7] = [
        Self::Auth,
        Self::Quota,
        Self::NotFound,
        Self::Timeout,
        Self::Cancelled,
        Self::EmptyResponse,
        Self::Unknown,
    ];

    /// Returns the canonical code string (e.g., `"E2001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth => "E1002",
            Self::NotFound => "E1004",
            Self::Quota => "E2001",
            Self::Timeout => "E3003",
            Self::EmptyResponse => "E3004",
            Self::Cancelled => "E4002",
            Self::Unknown => "E9999",
        }
    }

    /// Returns the standard name (e.g., `"quota"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Quota => "quota",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::EmptyResponse => "empty_response",
            Self::Unknown => "unknown",
        }
    }

    /// Terminal classifications abort the whole `generate` call without
    /// consulting further candidates.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Auth | Self::Cancelled)
    }

    /// Whether this failure should lengthen the model's adaptive delay.
    #[inline]
    pub fn feeds_backoff(&self) -> bool {
        matches!(self, Self::Quota)
    }

    /// Short human description used when synthesizing aggregate errors.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Auth => "authentication failed",
            Self::Quota => "quota or rate limit exceeded",
            Self::NotFound => "model not found",
            Self::Timeout => "request timed out",
            Self::Cancelled => "request cancelled",
            Self::EmptyResponse => "provider returned an empty response",
            Self::Unknown => "provider unavailable",
        }
    }

    /// Maps an HTTP status code to the most likely classification.
    ///
    /// Adapters refine this with the vendor's payload shape; this is the
    /// status-only baseline.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            404 => Self::NotFound,
            408 | 504 => Self::Timeout,
            429 => Self::Quota,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
