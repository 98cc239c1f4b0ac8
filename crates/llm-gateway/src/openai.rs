use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::ModelProvider;

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Adapter for any chat-completions endpoint (OpenAI, Groq and other
/// compatible gateways differ only in base URL, model and key).
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    name: String,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// OpenAI adapter from `OPENAI_API_KEY` / `OPENAI_MODEL`.
    pub fn openai_from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::MissingApiKey("openai".into()))?;
        let model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Ok(Self::new("openai", "https://api.openai.com/v1", api_key, model))
    }

    /// Groq adapter from `GROQ_API_KEY` / `GROQ_MODEL`.
    pub fn groq_from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| ProviderError::MissingApiKey("groq".into()))?;
        let model = std::env::var("GROQ_MODEL")
            .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string());
        Ok(Self::new(
            "groq",
            "https://api.groq.com/openai/v1",
            api_key,
            model,
        ))
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> ProviderResult<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            temperature: 0.3,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }

        let completion = response.json::<ChatCompletionResponse>().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in completion".into()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
