//! # ai-relay
//!
//! Scheduling and fallback layer for calls to hosted (and self-hosted) text
//! generation models.
//!
//! ## Overview
//!
//! Applications call [`Relay::generate`] with a prompt and get back the text,
//! its token usage and the model that produced it, or one classified error.
//! Underneath, the relay:
//!
//! - spaces requests per model with an adaptive delay that backs off on quota
//!   errors and recovers after sustained success ([`resilience::RateTracker`]);
//! - tries the selected model, then the rest of its provider's models, then
//!   other providers in priority order, skipping providers without a key;
//! - classifies every failure into a closed taxonomy
//!   ([`ErrorClassification`]) and only surfaces an error once all candidates
//!   are exhausted or a terminal failure (bad key, caller cancel) occurs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_relay::{GenerateOptions, RelayBuilder};
//!
//! #[tokio::main]
//! async fn main() -> ai_relay::Result<()> {
//!     // Config from AI_RELAY_CONFIG (or built-in providers), keys from <PROVIDER>_API_KEY.
//!     let relay = RelayBuilder::new().build()?;
//!
//!     let generation = relay
//!         .generate(
//!             "Write two sentences appreciating a diligent student.",
//!             GenerateOptions::new().with_name_hint("Alice"),
//!         )
//!         .await?;
//!     println!("[{}] {}", generation.model_used, generation.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Relay`], builder, candidate queue, executor, fallback orchestrator |
//! | [`config`] | YAML/env configuration and the built-in provider table |
//! | [`drivers`] | Per-vendor request/response adapters and failure classification |
//! | [`error`] | Crate error type with structured context |
//! | [`error_code`] | Closed failure taxonomy |
//! | [`resilience`] | Adaptive rate tracker and durable state store |
//! | [`telemetry`] | Lifecycle events and sinks |
//! | [`tokens`] | Usage records, token estimation, session cost totals |
//! | [`transport`] | HTTP transport and credential lookup |

pub mod client;
pub mod config;
pub mod drivers;
pub mod error;
pub mod error_code;
pub mod resilience;
pub mod telemetry;
pub mod tokens;
pub mod transport;

// Re-export main types for convenience
pub use client::{
    Candidate, CandidateExecutor, FallbackOrchestrator, GenerateOptions, Generation, Outcome,
    Relay, RelayBuilder, RequestExecutor,
};
pub use config::{ApiStyle, RelayConfig};
pub use error::{Error, ErrorContext, ExhaustedError};
pub use error_code::ErrorClassification;
pub use resilience::{RateTracker, RateTrackerConfig};
pub use telemetry::{EventSink, GenerationEvent};
pub use tokens::{SessionUsage, UsageRecord};
pub use tokio_util::sync::CancellationToken;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
