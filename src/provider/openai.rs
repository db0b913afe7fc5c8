use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::ProviderConfig;
use crate::utils::truncate_str;

use super::{ModelProvider, ProviderError};

/// OpenAI-compatible chat-completions provider.
///
/// Requests pin `response_format` to `json_object` — the coach prompt asks
/// for a JSON plan and this keeps the model from wrapping it in prose.
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, config: &ProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "response_format": {"type": "json_object"},
            "temperature": self.temperature,
        });

        let url = format!("{}/chat/completions", self.base_url);
        info!(model = %self.model, "Calling LLM API");

        let response = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("LLM request failed: {}", e);
                return Err(ProviderError::network(&e).into());
            }
        };

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!(status = %status, "LLM API error: {}", truncate_str(&text, 300));
            return Err(ProviderError::from_status(status.as_u16(), &text).into());
        }

        debug!("LLM response: {}", truncate_str(&text, 2000));

        let data: Value = serde_json::from_str(&text)?;
        let content = data["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| anyhow::anyhow!("no message content in LLM response"))?;
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderErrorKind;

    fn provider_at(base_url: &str) -> OpenAiProvider {
        let config = ProviderConfig {
            base_url: base_url.to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            request_timeout_secs: 2,
        };
        OpenAiProvider::new("sk-test", &config).unwrap()
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_a_network_error() {
        let provider = provider_at("http://127.0.0.1:9");
        let err = provider.chat_json("s", "u").await.unwrap_err();
        let provider_err = err.downcast_ref::<ProviderError>().unwrap();
        assert!(matches!(
            provider_err.kind,
            ProviderErrorKind::Network | ProviderErrorKind::Timeout
        ));
        assert!(provider_err.is_retryable());
    }
}
