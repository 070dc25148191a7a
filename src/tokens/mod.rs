//! Token accounting: usage records, estimation and session cost totals.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`UsageRecord`] | Token counts and generation time of one call |
//! | [`SessionUsage`] | Process-wide running totals (tokens, estimated cost) |
//! | [`ModelPricing`] | Cost per 1k input/output tokens for a model |
//! | [`CharacterEstimator`] | Fallback estimate when a vendor omits usage (4 chars ≈ 1 token) |

mod counter;
mod pricing;
mod session;

pub use counter::{CharacterEstimator, TokenCounter};
pub use pricing::{CostEstimate, ModelPricing};
pub use session::{SessionSnapshot, SessionUsage, UsageRecord};
