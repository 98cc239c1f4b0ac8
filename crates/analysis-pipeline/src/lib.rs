pub mod prompt;

use analysis_core::{AnalysisError, AnalysisRequest, AnalysisResult, Fingerprint, QualityScore};
use analysis_store::{AnalysisStore, StoreConfig};
use cache_manager::{AnalysisCache, CacheConfig, CacheStats};
use chrono::Utc;
use llm_gateway::{GatewayConfig, ProviderChain, ProviderHealth};
use quality_gate::{QualityConfig, QualityGate};
use rate_limiter::{RateLimitConfig, RateLimitDecision, SlidingWindowLimiter};
use serde::Serialize;
use std::time::Duration;

/// Aggregated configuration for one pipeline instance
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub gateway: GatewayConfig,
    pub quality: QualityConfig,
    /// Durable persistence of rate-limit and cache state; None keeps both
    /// in-process only
    pub store: Option<StoreConfig>,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            rate_limit: RateLimitConfig::from_env(),
            cache: CacheConfig::from_env(),
            gateway: GatewayConfig::from_env(),
            quality: QualityConfig::from_env(),
            store: std::env::var("DATABASE_URL")
                .ok()
                .map(|_| StoreConfig::from_env()),
        }
    }
}

/// What the calling layer receives: the structured result plus its quality
/// metadata
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedResponse {
    pub result: AnalysisResult,
    pub quality: QualityScore,
    pub was_fixed: bool,
    pub from_cache: bool,
    /// Provider that answered; None when served from cache
    pub provider: Option<String>,
}

/// Long-lived service owning one instance of every pipeline component.
///
/// Request flow: rate check, cache lookup, provider chain, extraction,
/// quality gate, cache write. A rate-limit denial short-circuits before any
/// provider call; provider exhaustion and extraction failures are terminal
/// for the request and never retried here.
pub struct AnalysisPipeline {
    limiter: SlidingWindowLimiter,
    cache: AnalysisCache,
    chain: ProviderChain,
    gate: QualityGate,
    store: Option<AnalysisStore>,
    cache_ttl: Duration,
}

impl AnalysisPipeline {
    /// Assemble from config, building the provider chain from whichever
    /// API keys are present in the environment.
    pub async fn from_config(config: PipelineConfig) -> anyhow::Result<Self> {
        let chain = ProviderChain::from_env(config.gateway.clone());
        Self::with_chain(config, chain).await
    }

    pub async fn from_env() -> anyhow::Result<Self> {
        Self::from_config(PipelineConfig::from_env()).await
    }

    /// Assemble around an externally built provider chain.
    pub async fn with_chain(config: PipelineConfig, chain: ProviderChain) -> anyhow::Result<Self> {
        let limiter = SlidingWindowLimiter::new(config.rate_limit.clone());
        let cache = AnalysisCache::connect(config.cache.clone()).await;

        let store = match &config.store {
            Some(store_config) => Some(AnalysisStore::connect(store_config.clone()).await?),
            None => None,
        };

        if let Some(store) = &store {
            match store.load_windows(config.rate_limit.window).await {
                Ok(windows) => limiter.hydrate(windows),
                Err(e) => tracing::warn!("Skipping rate-limit hydration: {}", e),
            }
            match store.load_entries().await {
                Ok(entries) => cache.hydrate(
                    entries
                        .into_iter()
                        .map(|e| (e.fingerprint, e.payload, e.cached_at, e.ttl))
                        .collect(),
                ),
                Err(e) => tracing::warn!("Skipping cache hydration: {}", e),
            }
        }

        Ok(Self {
            limiter,
            cache,
            chain,
            gate: QualityGate::new(config.quality),
            store,
            cache_ttl: config.cache.ttl,
        })
    }

    /// Run one request through the full pipeline.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalyzedResponse, AnalysisError> {
        if let RateLimitDecision::Denied { retry_after } = self.limiter.check(&request.user_id) {
            tracing::info!(
                "Denied request from {} ({}s until a slot frees)",
                request.user_id,
                retry_after.as_secs()
            );
            return Err(AnalysisError::RateLimitExceeded { retry_after });
        }
        self.persist_admission(&request.user_id);

        let fingerprint = Fingerprint::of(request);
        if let Some(cached) = self.cache.get(&fingerprint).await {
            tracing::info!("Cache hit for request from {}", request.user_id);
            let quality = self.gate.validate(&cached);
            return Ok(AnalyzedResponse {
                result: cached,
                quality,
                was_fixed: false,
                from_cache: true,
                provider: None,
            });
        }

        let prompt = prompt::build(request);
        let raw = self.chain.call(&prompt).await?;
        let extracted = response_extractor::extract(&raw.text)?;
        let assessment = self.gate.assess(extracted);

        if !assessment.quality.is_valid {
            tracing::warn!(
                "Returning low-quality analysis (score {:.1}, {} issues) from {}",
                assessment.quality.score,
                assessment.quality.issues.len(),
                raw.provider
            );
        }

        self.cache.set(&fingerprint, &assessment.result).await;
        self.persist_entry(&fingerprint, &assessment.result);

        Ok(AnalyzedResponse {
            result: assessment.result,
            quality: assessment.quality,
            was_fixed: assessment.was_fixed,
            from_cache: false,
            provider: Some(raw.provider),
        })
    }

    /// Fire-and-forget write of one admission to the durable store.
    fn persist_admission(&self, user_id: &str) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.record_admission(&user_id, Utc::now()).await {
                tracing::debug!("Failed to persist admission: {}", e);
            }
        });
    }

    /// Fire-and-forget write of one cache entry to the durable store.
    fn persist_entry(&self, fingerprint: &Fingerprint, result: &AnalysisResult) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let fingerprint = fingerprint.clone();
        let result = result.clone();
        let ttl = self.cache_ttl;
        tokio::spawn(async move {
            if let Err(e) = store.save_entry(&fingerprint, &result, ttl).await {
                tracing::debug!("Failed to persist cache entry: {}", e);
            }
        });
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn provider_health(&self) -> Vec<(String, ProviderHealth)> {
        self.chain.health().all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm_gateway::{ModelProvider, ProviderError, ProviderResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubProvider {
        name: &'static str,
        reply: Result<String, &'static str>,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn ok(name: &'static str, reply: &str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str, error: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Err(error),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelProvider for StubProvider {
        async fn invoke(&self, _prompt: &str, _timeout: Duration) -> ProviderResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(ProviderError::ServiceUnavailable(e.to_string())),
            }
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    const GOOD_REPLY: &str = "Here you go:\n```json\n{\"summary_text\":\"SEC approved a spot \
        Bitcoin ETF, unlocking institutional capital inflows.\",\"impact_points\":\
        [\"Increases institutional demand\",\"Reduces custody friction\"],\
        \"action\":\"WATCH\",\"risk_level\":\"Medium\"}\n```\nHope that helps!";

    async fn pipeline_with(providers: Vec<Arc<dyn ModelProvider>>) -> AnalysisPipeline {
        let chain = ProviderChain::new(providers, GatewayConfig::default());
        AnalysisPipeline::with_chain(PipelineConfig::default(), chain)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let provider = StubProvider::ok("stub", GOOD_REPLY);
        let pipeline = pipeline_with(vec![provider.clone()]).await;
        let request = AnalysisRequest::new("Bitcoin ETF approved by regulator", "u1");

        let first = pipeline.analyze(&request).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.provider.as_deref(), Some("stub"));
        assert!(first.quality.is_valid);

        let second = pipeline.analyze(&request).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.provider, None);
        assert_eq!(second.result, first.result);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limited_request_never_reaches_a_provider() {
        let provider = StubProvider::ok("stub", GOOD_REPLY);
        let chain = ProviderChain::new(vec![provider.clone()], GatewayConfig::default());
        let config = PipelineConfig {
            rate_limit: RateLimitConfig {
                max_requests: 1,
                window: Duration::from_secs(60),
            },
            ..Default::default()
        };
        let pipeline = AnalysisPipeline::with_chain(config, chain).await.unwrap();

        pipeline
            .analyze(&AnalysisRequest::new("first question", "u1"))
            .await
            .unwrap();
        let denied = pipeline
            .analyze(&AnalysisRequest::new("second question", "u1"))
            .await;

        assert!(matches!(
            denied,
            Err(AnalysisError::RateLimitExceeded { .. })
        ));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn fallback_provider_answers_when_the_first_fails() {
        let a = StubProvider::failing("a", "boom");
        let b = StubProvider::ok("b", GOOD_REPLY);
        let pipeline = pipeline_with(vec![a.clone(), b.clone()]).await;

        let response = pipeline
            .analyze(&AnalysisRequest::new("ETH upgrade shipped", "u1"))
            .await
            .unwrap();
        assert_eq!(response.provider.as_deref(), Some("b"));

        let health = pipeline.provider_health();
        let a_health = health.iter().find(|(name, _)| name == "a").unwrap();
        assert_eq!(a_health.1.failures, 1);
    }

    #[tokio::test]
    async fn exhausted_chain_is_terminal() {
        let pipeline = pipeline_with(vec![
            StubProvider::failing("a", "down"),
            StubProvider::failing("b", "down"),
        ])
        .await;

        assert!(matches!(
            pipeline
                .analyze(&AnalysisRequest::new("anything", "u1"))
                .await,
            Err(AnalysisError::AllProvidersFailed { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn unparseable_provider_text_is_an_extraction_error() {
        let pipeline =
            pipeline_with(vec![StubProvider::ok("stub", "no structured payload here")]).await;

        assert!(matches!(
            pipeline
                .analyze(&AnalysisRequest::new("anything", "u1"))
                .await,
            Err(AnalysisError::ExtractionError(_))
        ));
    }

    #[tokio::test]
    async fn degraded_reply_is_fixed_before_returning() {
        let dirty = "{\"summary_text\":\"Summary: It depends. Hard to say. Time will tell. \
            SEC approved a spot Bitcoin ETF, unlocking institutional capital inflows.\",\
            \"impact_points\":[\"- Increases institutional demand\",\"- Reduces custody \
            friction\"],\"action\":\"moon\",\"risk_level\":\"Medium\"}";
        let pipeline = pipeline_with(vec![StubProvider::ok("stub", dirty)]).await;

        let response = pipeline
            .analyze(&AnalysisRequest::new("Bitcoin ETF", "u1"))
            .await
            .unwrap();
        assert!(response.was_fixed);
        assert!(response.result.summary_text.starts_with("SEC approved"));
        assert!(response.result.impact_points[0].starts_with("Increases"));
        assert_eq!(response.result.action, None);
    }

    #[tokio::test]
    async fn low_quality_reply_is_returned_with_its_score_not_rejected() {
        let poor = "{\"summary_text\":\"It depends.\",\"impact_points\":[\"x\"]}";
        let pipeline = pipeline_with(vec![StubProvider::ok("stub", poor)]).await;

        let response = pipeline
            .analyze(&AnalysisRequest::new("anything", "u1"))
            .await
            .unwrap();
        assert!(!response.quality.is_valid);
        assert!(response.quality.score < 4.0);
    }

    #[tokio::test]
    async fn equivalent_requests_from_different_users_share_the_cache() {
        let provider = StubProvider::ok("stub", GOOD_REPLY);
        let pipeline = pipeline_with(vec![provider.clone()]).await;

        pipeline
            .analyze(&AnalysisRequest::new("Bitcoin ETF approved", "alice"))
            .await
            .unwrap();
        let second = pipeline
            .analyze(&AnalysisRequest::new("  bitcoin   ETF approved ", "bob"))
            .await
            .unwrap();

        assert!(second.from_cache);
        assert_eq!(provider.calls(), 1);
    }
}
