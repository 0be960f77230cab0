//! Provider selection.
//!
//! Adapters are strategies keyed by [`ProviderId`]. A job may name its
//! provider; otherwise the configured default is used.

use std::collections::HashMap;
use std::sync::Arc;

use drape_core::generation::ProviderId;

use crate::adapter::{ArtifactSink, ProviderAdapter};
use crate::api::HttpTaskApi;
use crate::error::ProviderError;
use crate::executor::{ExecutorConfig, TaskExecutor};
use crate::multimodal::MultimodalAdapter;
use crate::tryon::TryOnServiceAdapter;

/// Base URL and credentials for one provider API.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub url: String,
    pub api_key: Option<String>,
}

/// Provider endpoints loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub tryon: Option<ServiceEndpoint>,
    pub multimodal: Option<ServiceEndpoint>,
    pub default_provider: ProviderId,
}

fn endpoint_from_env(url_var: &str, key_var: &str) -> Option<ServiceEndpoint> {
    let url = std::env::var(url_var).ok().filter(|s| !s.trim().is_empty())?;
    let api_key = std::env::var(key_var).ok().filter(|s| !s.trim().is_empty());
    Some(ServiceEndpoint { url, api_key })
}

impl ProviderConfig {
    /// | Env Var              | Default         |
    /// |----------------------|-----------------|
    /// | `TRYON_API_URL`      | unset (disabled) |
    /// | `TRYON_API_KEY`      | unset           |
    /// | `MULTIMODAL_API_URL` | unset (disabled) |
    /// | `MULTIMODAL_API_KEY` | unset           |
    /// | `DEFAULT_PROVIDER`   | `tryon-service` |
    pub fn from_env() -> Self {
        let default_provider: ProviderId = std::env::var("DEFAULT_PROVIDER")
            .unwrap_or_else(|_| "tryon-service".into())
            .parse()
            .expect("DEFAULT_PROVIDER must be tryon-service or multimodal");

        Self {
            tryon: endpoint_from_env("TRYON_API_URL", "TRYON_API_KEY"),
            multimodal: endpoint_from_env("MULTIMODAL_API_URL", "MULTIMODAL_API_KEY"),
            default_provider,
        }
    }
}

/// Configured adapters keyed by provider id.
#[derive(Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
    default_provider: ProviderId,
}

impl ProviderRegistry {
    pub fn new(default_provider: ProviderId) -> Self {
        Self {
            adapters: HashMap::new(),
            default_provider,
        }
    }

    /// Build HTTP-backed adapters for every configured endpoint.
    pub fn from_config(config: &ProviderConfig, executor: &ExecutorConfig, sink: ArtifactSink) -> Self {
        let mut registry = Self::new(config.default_provider);
        let client = reqwest::Client::new();

        if let Some(endpoint) = &config.tryon {
            let api = HttpTaskApi::with_client(client.clone(), endpoint.url.clone(), endpoint.api_key.clone());
            let executor = TaskExecutor::new(Arc::new(api), executor.clone(), ProviderId::TryonService.as_str());
            registry.register(Arc::new(TryOnServiceAdapter::new(executor, sink.clone())));
        }
        if let Some(endpoint) = &config.multimodal {
            let api = HttpTaskApi::with_client(client, endpoint.url.clone(), endpoint.api_key.clone());
            let executor = TaskExecutor::new(Arc::new(api), executor.clone(), ProviderId::Multimodal.as_str());
            registry.register(Arc::new(MultimodalAdapter::new(executor, sink)));
        }

        if !registry.is_configured(config.default_provider) {
            tracing::warn!(
                default_provider = %config.default_provider,
                "Default provider has no endpoint configured; generation requests will fail",
            );
        }
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn default_provider(&self) -> ProviderId {
        self.default_provider
    }

    pub fn is_configured(&self, id: ProviderId) -> bool {
        self.adapters.contains_key(&id)
    }

    /// Adapter for `requested`, falling back to the default provider.
    pub fn get(&self, requested: Option<ProviderId>) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        let id = requested.unwrap_or(self.default_provider);
        self.adapters
            .get(&id)
            .cloned()
            .ok_or_else(|| ProviderError::Validation(format!("Provider '{id}' is not configured")))
    }
}
