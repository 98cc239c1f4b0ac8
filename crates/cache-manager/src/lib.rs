use analysis_core::{AnalysisResult, Fingerprint};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

const REDIS_KEY_PREFIX: &str = "newsiq:analysis:";

/// Cache configuration, env-overridable at bootstrap
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Shared cache endpoint; None disables the external tier
    pub redis_url: Option<String>,
    /// Default entry lifetime
    pub ttl: Duration,
    /// Local tier capacity; oldest entry is evicted on insert when full
    pub max_local_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl: Duration::from_secs(3600),
            max_local_entries: 1024,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL").ok(),
            ttl: Duration::from_secs(
                std::env::var("CACHE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            max_local_entries: std::env::var("CACHE_MAX_LOCAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024),
        }
    }
}

/// Cache counters exposed to the calling layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub local_entries: usize,
    pub redis_healthy: bool,
}

struct LocalEntry {
    payload: AnalysisResult,
    cached_at: DateTime<Utc>,
    ttl: Duration,
}

impl LocalEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.cached_at).to_std().map(|age| age >= self.ttl).unwrap_or(false)
    }
}

/// Two-tier response cache: shared Redis first, local in-process map as
/// fallback.
///
/// The Redis tier is best-effort. Any failure there flips the health flag
/// and degrades reads/writes to the local tier; it never surfaces as an
/// error. Local TTL is enforced lazily at read, expired entries are removed
/// when observed.
pub struct AnalysisCache {
    redis: Option<redis::aio::ConnectionManager>,
    local: DashMap<String, LocalEntry>,
    default_ttl: Duration,
    max_local_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    redis_healthy: AtomicBool,
}

impl AnalysisCache {
    /// Connect to the configured Redis tier, degrading to local-only when
    /// the endpoint is absent or unreachable.
    pub async fn connect(config: CacheConfig) -> Self {
        let redis = match &config.redis_url {
            Some(url) => match Self::open_redis(url).await {
                Ok(manager) => {
                    tracing::info!("Cache: connected to shared Redis tier");
                    Some(manager)
                }
                Err(e) => {
                    tracing::warn!("Cache: Redis unreachable ({}), local tier only", e);
                    None
                }
            },
            None => None,
        };

        let redis_configured = redis.is_some();
        Self {
            redis,
            local: DashMap::new(),
            default_ttl: config.ttl,
            max_local_entries: config.max_local_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            redis_healthy: AtomicBool::new(redis_configured),
        }
    }

    /// Local tier only, no external cache.
    pub fn local_only(config: CacheConfig) -> Self {
        Self {
            redis: None,
            local: DashMap::new(),
            default_ttl: config.ttl,
            max_local_entries: config.max_local_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            redis_healthy: AtomicBool::new(false),
        }
    }

    async fn open_redis(url: &str) -> Result<redis::aio::ConnectionManager, redis::RedisError> {
        let client = redis::Client::open(url)?;
        client.get_connection_manager().await
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<AnalysisResult> {
        if let Some(result) = self.get_redis(fingerprint).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(result);
        }

        match self.get_local(fingerprint, Utc::now()) {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn get_redis(&self, fingerprint: &Fingerprint) -> Option<AnalysisResult> {
        let mut conn = self.redis.clone()?;
        let key = format!("{}{}", REDIS_KEY_PREFIX, fingerprint);

        let payload: Option<String> = match conn.get(&key).await {
            Ok(payload) => {
                self.redis_healthy.store(true, Ordering::Relaxed);
                payload
            }
            Err(e) => {
                if self.redis_healthy.swap(false, Ordering::Relaxed) {
                    tracing::warn!("Cache: Redis read failed ({}), degrading to local tier", e);
                }
                return None;
            }
        };

        match payload {
            Some(json) => match serde_json::from_str(&json) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!("Cache: discarding undecodable Redis entry: {}", e);
                    None
                }
            },
            None => None,
        }
    }

    fn get_local(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Option<AnalysisResult> {
        let key = fingerprint.as_str();
        let expired = match self.local.get(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => return Some(entry.payload.clone()),
            None => return None,
        };
        if expired {
            self.local.remove(key);
        }
        None
    }

    /// Store with the default TTL.
    pub async fn set(&self, fingerprint: &Fingerprint, value: &AnalysisResult) {
        self.set_with_ttl(fingerprint, value, self.default_ttl).await;
    }

    /// Write-through to both tiers when Redis is reachable, local-only
    /// otherwise.
    pub async fn set_with_ttl(&self, fingerprint: &Fingerprint, value: &AnalysisResult, ttl: Duration) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Cache: failed to serialize entry, skipping: {}", e);
                return;
            }
        };

        if let Some(mut conn) = self.redis.clone() {
            let key = format!("{}{}", REDIS_KEY_PREFIX, fingerprint);
            let result: Result<(), redis::RedisError> =
                conn.set_ex(&key, json, ttl.as_secs().max(1)).await;
            match result {
                Ok(()) => {
                    self.redis_healthy.store(true, Ordering::Relaxed);
                }
                Err(e) => {
                    if self.redis_healthy.swap(false, Ordering::Relaxed) {
                        tracing::warn!("Cache: Redis write failed ({}), local tier only", e);
                    }
                }
            }
        }

        self.insert_local(fingerprint, value.clone(), ttl, Utc::now());
    }

    fn insert_local(
        &self,
        fingerprint: &Fingerprint,
        payload: AnalysisResult,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        let key = fingerprint.as_str().to_string();
        if !self.local.contains_key(&key) && self.local.len() >= self.max_local_entries {
            self.evict_oldest();
        }
        self.local.insert(
            key,
            LocalEntry {
                payload,
                cached_at: now,
                ttl,
            },
        );
    }

    fn evict_oldest(&self) {
        let oldest = self
            .local
            .iter()
            .min_by_key(|entry| entry.value().cached_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            tracing::debug!("Cache: local tier full, evicting oldest entry");
            self.local.remove(&key);
        }
    }

    /// Seed the local tier with entries persisted across a restart. Entries
    /// keep their original insertion time, so remaining TTL is honored.
    pub fn hydrate(&self, entries: Vec<(String, AnalysisResult, DateTime<Utc>, Duration)>) {
        for (key, payload, cached_at, ttl) in entries {
            self.local.insert(
                key,
                LocalEntry {
                    payload,
                    cached_at,
                    ttl,
                },
            );
        }
    }

    /// Invalidate one entry in both tiers.
    pub async fn delete(&self, fingerprint: &Fingerprint) {
        if let Some(mut conn) = self.redis.clone() {
            let key = format!("{}{}", REDIS_KEY_PREFIX, fingerprint);
            let result: Result<(), redis::RedisError> = conn.del(&key).await;
            if let Err(e) = result {
                if self.redis_healthy.swap(false, Ordering::Relaxed) {
                    tracing::warn!("Cache: Redis delete failed ({})", e);
                }
            }
        }
        self.local.remove(fingerprint.as_str());
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            local_entries: self.local.len(),
            redis_healthy: self.redis_healthy.load(Ordering::Relaxed),
        }
    }
}
