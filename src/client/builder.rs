use super::core::Relay;
use super::executor::{CandidateExecutor, RequestExecutor};
use super::orchestrator::FallbackOrchestrator;
use crate::config::RelayConfig;
use crate::resilience::{FileStore, KeyValueStore, RateTracker, RateTrackerConfig};
use crate::telemetry::EventSink;
use crate::tokens::SessionUsage;
use crate::transport::{CredentialSource, EnvCredentials, HttpTransport};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;

/// Builder for [`Relay`].
///
/// Everything left unset is resolved from the environment at `build`:
/// configuration from `AI_RELAY_CONFIG` (built-in providers otherwise),
/// persistence from `AI_RELAY_STATE_DIR` (in-process only otherwise) and
/// keys from `<PROVIDER>_API_KEY`.
pub struct RelayBuilder {
    config: Option<RelayConfig>,
    store: Option<Arc<dyn KeyValueStore>>,
    credentials: Option<Arc<dyn CredentialSource>>,
    events: Arc<dyn EventSink>,
    executor: Option<Arc<dyn CandidateExecutor>>,
    transport: Option<HttpTransport>,
    selected_model: Option<String>,
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            store: None,
            credentials: None,
            events: crate::telemetry::noop_sink(),
            executor: None,
            transport: None,
            selected_model: None,
        }
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Persist adapted delays in `store`.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Inject an event sink. Default is a no-op sink.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Replace the HTTP executor (fakes in tests, custom transports).
    pub fn with_executor(mut self, executor: Arc<dyn CandidateExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_transport(mut self, transport: HttpTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Model tried first. Defaults to the first model of the highest
    /// priority provider.
    pub fn with_selected_model(mut self, model: impl Into<String>) -> Self {
        self.selected_model = Some(model.into());
        self
    }

    pub fn build(self) -> Result<Relay> {
        let config = match self.config {
            Some(config) => config,
            None => RelayConfig::from_env()?,
        };
        config.validate()?;
        let config = Arc::new(config);

        let tracker_cfg = RateTrackerConfig::from_relay_config(&config);
        let store = self
            .store
            .or_else(|| FileStore::from_env().map(|s| Arc::new(s) as Arc<dyn KeyValueStore>));
        let tracker = Arc::new(match store {
            Some(store) => RateTracker::with_store(tracker_cfg, store),
            None => RateTracker::new(tracker_cfg),
        });

        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(EnvCredentials::new()));
        let usage = Arc::new(SessionUsage::new());
        let executor: Arc<dyn CandidateExecutor> = match self.executor {
            Some(executor) => executor,
            None => {
                let transport = match self.transport {
                    Some(t) => t,
                    None => HttpTransport::new()?,
                };
                Arc::new(RequestExecutor::new(
                    config.clone(),
                    transport,
                    credentials.clone(),
                    usage.clone(),
                ))
            }
        };

        let selected_model = match self.selected_model {
            Some(model) => model,
            None => default_model(&config)?,
        };

        Ok(Relay {
            orchestrator: FallbackOrchestrator::new(
                config,
                tracker,
                executor,
                credentials,
                self.events,
                selected_model,
            ),
            usage,
        })
    }
}

fn default_model(config: &RelayConfig) -> Result<String> {
    config
        .provider_order()
        .into_iter()
        .filter_map(|id| config.provider(id))
        .find_map(|p| p.models.first().cloned())
        .ok_or_else(|| {
            Error::configuration_with_context(
                "no models configured",
                ErrorContext::new()
                    .with_field_path("providers")
                    .with_source("relay_builder"),
            )
        })
}
