pub mod anthropic;
pub mod error;
pub mod health;
pub mod openai;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use error::{ProviderError, ProviderResult};
pub use health::{HealthRegistry, ProviderHealth};
pub use openai::OpenAiCompatProvider;
pub use provider::ModelProvider;

use analysis_core::{AnalysisError, RawProviderResponse};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upper bound on each single provider attempt
    pub per_provider_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            per_provider_timeout: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            per_provider_timeout: Duration::from_secs(
                std::env::var("PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

/// Strict ordered fallback over a fixed provider list.
///
/// Providers are tried in configuration order; the first success wins and
/// no further providers are consulted. A timeout counts as a provider
/// failure. Worst-case latency is the sum of per-provider timeouts.
pub struct ProviderChain {
    providers: Vec<Arc<dyn ModelProvider>>,
    health: HealthRegistry,
    per_provider_timeout: Duration,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn ModelProvider>>, config: GatewayConfig) -> Self {
        Self {
            providers,
            health: HealthRegistry::new(),
            per_provider_timeout: config.per_provider_timeout,
        }
    }

    /// Build the chain from whichever provider keys are present in the
    /// environment, in preference order: OpenAI, Groq, Anthropic.
    pub fn from_env(config: GatewayConfig) -> Self {
        let mut providers: Vec<Arc<dyn ModelProvider>> = Vec::new();

        match OpenAiCompatProvider::openai_from_env() {
            Ok(p) => providers.push(Arc::new(p)),
            Err(e) => tracing::debug!("Skipping OpenAI provider: {}", e),
        }
        match OpenAiCompatProvider::groq_from_env() {
            Ok(p) => providers.push(Arc::new(p)),
            Err(e) => tracing::debug!("Skipping Groq provider: {}", e),
        }
        match AnthropicProvider::from_env() {
            Ok(p) => providers.push(Arc::new(p)),
            Err(e) => tracing::debug!("Skipping Anthropic provider: {}", e),
        }

        if providers.is_empty() {
            tracing::warn!("Provider chain is empty: no provider API keys configured");
        } else {
            let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
            tracing::info!("Provider chain: {}", names.join(" -> "));
        }

        Self::new(providers, config)
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Try each provider in order, returning the first successful raw
    /// response. Exhaustion yields `AllProvidersFailed` carrying the last
    /// error for diagnostics.
    pub async fn call(&self, prompt: &str) -> Result<RawProviderResponse, AnalysisError> {
        let mut attempts = 0usize;
        let mut last_error = "no providers configured".to_string();

        for provider in &self.providers {
            attempts += 1;
            let name = provider.name();
            let started = tokio::time::Instant::now();

            let outcome = tokio::time::timeout(
                self.per_provider_timeout,
                provider.invoke(prompt, self.per_provider_timeout),
            )
            .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(text)) => {
                    self.health.record_success(name, latency_ms);
                    tracing::info!(
                        "Provider {} answered in {}ms (attempt {})",
                        name,
                        latency_ms,
                        attempts
                    );
                    return Ok(RawProviderResponse {
                        provider: name.to_string(),
                        text,
                        latency_ms,
                        received_at: Utc::now(),
                    });
                }
                Ok(Err(e)) => {
                    self.health.record_failure(name, &e.to_string());
                    tracing::warn!("Provider {} failed: {}, trying next", name, e);
                    last_error = format!("{}: {}", name, e);
                }
                Err(_) => {
                    let e = ProviderError::Timeout(self.per_provider_timeout);
                    self.health.record_failure(name, &e.to_string());
                    tracing::warn!("Provider {} {}, trying next", name, e);
                    last_error = format!("{}: {}", name, e);
                }
            }
        }

        tracing::error!(
            "All {} providers failed, last error: {}",
            attempts,
            last_error
        );
        Err(AnalysisError::AllProvidersFailed {
            attempts,
            last_error,
        })
    }
}
