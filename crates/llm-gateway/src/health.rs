use dashmap::DashMap;
use serde::Serialize;

/// Advisory per-provider counters. Never gates provider selection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderHealth {
    pub successes: u64,
    pub failures: u64,
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Default)]
pub struct HealthRegistry {
    records: DashMap<String, ProviderHealth>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, provider: &str, latency_ms: u64) {
        let mut entry = self.records.entry(provider.to_string()).or_default();
        entry.successes += 1;
        entry.last_latency_ms = Some(latency_ms);
        entry.last_error = None;
    }

    pub fn record_failure(&self, provider: &str, error: &str) {
        let mut entry = self.records.entry(provider.to_string()).or_default();
        entry.failures += 1;
        entry.last_error = Some(error.to_string());
    }

    pub fn get(&self, provider: &str) -> Option<ProviderHealth> {
        self.records.get(provider).map(|entry| entry.value().clone())
    }

    pub fn all(&self) -> Vec<(String, ProviderHealth)> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
