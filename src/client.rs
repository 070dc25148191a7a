//! Generation entry points: candidate queue, single-attempt executor and the
//! fallback orchestrator.
//!
//! Keep the public surface small: most applications only need [`Relay`],
//! [`RelayBuilder`] and [`GenerateOptions`]. Implementation details are split
//! into submodules under `src/client/`.

pub mod attempts;
pub mod builder;
pub mod candidates;
pub mod core;
pub mod executor;
pub mod orchestrator;
pub mod types;

pub use attempts::{Attempt, AttemptLog};
pub use builder::RelayBuilder;
pub use candidates::CandidateQueue;
pub use core::Relay;
pub use executor::{strip_reasoning, CandidateExecutor, RequestExecutor};
pub use orchestrator::FallbackOrchestrator;
pub use types::{Candidate, ExecuteOptions, GenerateOptions, Generation, Outcome};
