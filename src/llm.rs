use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Credential that short-circuits to canned responses, for offline runs.
pub const DUMMY_API_KEY: &str = "dummy-api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptPurpose {
    SqlGeneration,
    Summary,
}

/// A request to the text-generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub purpose: PromptPurpose,
    pub system: String,
    pub user: String,
}

/// The external service that turns schema + question into SQL and rows +
/// question into prose. Responses are treated as raw text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, api_key: &str, prompt: &Prompt) -> Result<String>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(model: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.0,
            max_tokens: 1000,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn dummy_response(prompt: &Prompt) -> String {
        match prompt.purpose {
            PromptPurpose::SqlGeneration => {
                "I don't have enough knowledge about that.".to_string()
            }
            PromptPurpose::Summary => {
                "For your data, the query ran successfully.".to_string()
            }
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, api_key: &str, prompt: &Prompt) -> Result<String> {
        if api_key == DUMMY_API_KEY {
            return Ok(Self::dummy_response(prompt));
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user}
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens
        });

        debug!(model = %self.model, purpose = ?prompt.purpose, "calling text-generation service");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        if !status.is_success() {
            let message = response_json["error"]["message"]
                .as_str()
                .unwrap_or("no error message");
            warn!(status = %status, "text-generation service returned an error");
            return Err(GatewayError::Llm(format!("HTTP {}: {}", status.as_u16(), message)));
        }

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| GatewayError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dummy_key_never_touches_the_network() {
        let client = LlmClient::new("gpt-4".into(), "http://127.0.0.1:9".into());
        let prompt = Prompt {
            purpose: PromptPurpose::Summary,
            system: String::new(),
            user: String::new(),
        };
        let text = client.generate(DUMMY_API_KEY, &prompt).await.unwrap();
        assert!(text.starts_with("For your data,"));
    }

    #[tokio::test]
    async fn unreachable_service_is_an_llm_error() {
        let client = LlmClient::new("gpt-4".into(), "http://127.0.0.1:9/".into());
        let prompt = Prompt {
            purpose: PromptPurpose::SqlGeneration,
            system: "s".into(),
            user: "u".into(),
        };
        let err = client.generate("sk-test", &prompt).await.unwrap_err();
        assert!(matches!(err, GatewayError::Llm(_)));
    }
}
