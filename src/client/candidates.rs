//! Candidate queue construction.

use super::types::Candidate;
use crate::config::RelayConfig;
use crate::transport::CredentialSource;
use tracing::warn;

/// Ordered candidates for one call, split by credential availability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateQueue {
    /// Dispatchable candidates, in the order they will be tried.
    pub candidates: Vec<Candidate>,
    /// Candidates dropped because their provider has no credential.
    pub skipped: Vec<Candidate>,
}

impl CandidateQueue {
    /// Order: `selected` first, then the rest of its provider's models, then
    /// every other provider's models in provider-priority order.
    ///
    /// A selected model that no provider serves is left out with a warning.
    pub fn build(config: &RelayConfig, selected: &str, credentials: &dyn CredentialSource) -> Self {
        let mut ordered: Vec<(String, String)> = Vec::new();
        // A model served by several providers yields one candidate per provider.
        let mut push = |model: &str, provider: &str| {
            if !ordered.iter().any(|(m, p)| m == model && p == provider) {
                ordered.push((model.to_string(), provider.to_string()));
            }
        };

        let selected_provider = config.provider_of(selected);
        match selected_provider {
            Some(provider_id) => {
                push(selected, provider_id);
                if let Some(provider) = config.provider(provider_id) {
                    for model in &provider.models {
                        push(model, provider_id);
                    }
                }
            }
            None => warn!(model = selected, "selected model is not served by any provider"),
        }

        for provider_id in config.provider_order() {
            if Some(provider_id) == selected_provider {
                continue;
            }
            if let Some(provider) = config.provider(provider_id) {
                for model in &provider.models {
                    push(model, provider_id);
                }
            }
        }

        let mut queue = Self::default();
        for (model_id, provider_id) in ordered {
            let has_credential = config
                .provider(&provider_id)
                .is_some_and(|p| credentials.has_credential(&provider_id, p));
            let candidate = Candidate {
                model_id,
                provider_id,
                has_credential,
            };
            if candidate.has_credential {
                queue.candidates.push(candidate);
            } else {
                queue.skipped.push(candidate);
            }
        }
        queue
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn model_ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.model_id.as_str()).collect()
    }
}
