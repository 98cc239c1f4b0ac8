use async_trait::async_trait;
use std::time::Duration;

use crate::error::ProviderResult;

/// Transport-agnostic interface to one external language-model provider.
///
/// Implementations own their HTTP plumbing; the orchestrator only sees
/// text out or an error, and treats a timeout like any other failure.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> ProviderResult<String>;

    fn name(&self) -> &str;
}
