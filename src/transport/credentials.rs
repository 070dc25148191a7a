//! API key resolution.
//!
//! The relay only reads credentials; storing and validating them belongs to
//! the host application.

use crate::config::ProviderConfig;
use keyring::Entry;
use std::collections::HashMap;
use std::env;

/// Resolves the API key a provider needs.
pub trait CredentialSource: Send + Sync {
    fn api_key(&self, provider_id: &str, provider: &ProviderConfig) -> Option<String>;

    /// Whether candidates of this provider may be dispatched at all.
    /// Local providers never need a key.
    fn has_credential(&self, provider_id: &str, provider: &ProviderConfig) -> bool {
        provider.local || self.api_key(provider_id, provider).is_some()
    }
}

/// Env var a provider's key is read from when none is configured.
pub fn default_key_env(provider_id: &str) -> String {
    format!("{}_API_KEY", provider_id.to_uppercase().replace('-', "_"))
}

/// Keys from the OS keyring (when enabled) and then environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    keyring_service: Option<String>,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look in the OS keyring under `service` / `<provider_id>` before the
    /// environment.
    pub fn with_keyring(mut self, service: impl Into<String>) -> Self {
        self.keyring_service = Some(service.into());
        self
    }

    fn from_keyring(&self, provider_id: &str) -> Option<String> {
        let service = self.keyring_service.as_deref()?;
        let entry = Entry::new(service, provider_id).ok()?;
        match entry.get_password() {
            Ok(key) if !key.trim().is_empty() => Some(key),
            Ok(_) => None,
            Err(e) => {
                tracing::trace!(provider = provider_id, error = %e, "no keyring entry");
                None
            }
        }
    }
}

impl CredentialSource for EnvCredentials {
    fn api_key(&self, provider_id: &str, provider: &ProviderConfig) -> Option<String> {
        if let Some(key) = self.from_keyring(provider_id) {
            return Some(key);
        }
        let var = provider
            .api_key_env
            .clone()
            .unwrap_or_else(|| default_key_env(provider_id));
        env::var(var).ok().filter(|k| !k.trim().is_empty())
    }
}

/// Fixed in-memory keys.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    keys: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, provider_id: impl Into<String>, key: impl Into<String>) -> Self {
        self.keys.insert(provider_id.into(), key.into());
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn api_key(&self, provider_id: &str, _provider: &ProviderConfig) -> Option<String> {
        self.keys.get(provider_id).cloned()
    }
}
