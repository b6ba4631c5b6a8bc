mod client;
pub(crate) mod types;

use anyhow::{anyhow, Result};

use client::OpenAiClient;
use types::{ChatRequest, WireMessage};

// =============================================================================
// Options
// =============================================================================

/// Per-call sampling knobs. Unset fields fall back to the provider defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the provider to constrain the reply to a JSON object. Only newer
    /// models accept this; older ones reject the request outright.
    pub json_mode: bool,
}

// =============================================================================
// OpenAi Agent
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    /// Point the agent at any OpenAI-compatible endpoint (OpenRouter, a local
    /// vLLM, ...).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn client(&self) -> Result<OpenAiClient> {
        let client = OpenAiClient::new(&self.api_key)?;
        Ok(match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        })
    }

    fn request(&self, system: String, user: String, options: &ChatOptions) -> ChatRequest {
        let mut request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user));

        if let Some(limit) = options.max_tokens {
            request = request.token_limit(limit);
        }
        if let Some(temperature) = options.temperature {
            if !types::uses_max_completion_tokens(&self.model) {
                request = request.temperature(temperature);
            }
        }
        if options.json_mode {
            request = request.json_object();
        }
        request
    }

    /// System + user chat completion returning the raw assistant text.
    pub async fn chat(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
        options: &ChatOptions,
    ) -> Result<String> {
        let request = self.request(system.into(), user.into(), options);
        let response = self.client()?.chat(&request).await?;

        response
            .text()
            .ok_or_else(|| anyhow!("No response from OpenAI"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_new() {
        let ai = OpenAi::new("sk-test", "gpt-4");
        assert_eq!(ai.model(), "gpt-4");
        assert_eq!(ai.api_key, "sk-test");
        assert!(ai.base_url.is_none());
    }

    #[test]
    fn test_openai_with_base_url() {
        let ai = OpenAi::new("sk-test", "gpt-4").with_base_url("https://openrouter.ai/api/v1");
        assert_eq!(ai.base_url.as_deref(), Some("https://openrouter.ai/api/v1"));
    }

    #[test]
    fn request_carries_sampling_options() {
        let ai = OpenAi::new("sk-test", "gpt-4");
        let options = ChatOptions {
            temperature: Some(0.2),
            max_tokens: Some(220),
            json_mode: true,
        };
        let request = ai.request("sys".into(), "user".into(), &options);
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(220));
        assert!(request.response_format.is_some());
        assert_eq!(request.messages.len(), 2);
    }

    #[test]
    fn reasoning_models_drop_temperature() {
        let ai = OpenAi::new("sk-test", "o3-mini");
        let options = ChatOptions {
            temperature: Some(0.3),
            max_tokens: Some(350),
            json_mode: false,
        };
        let request = ai.request("sys".into(), "user".into(), &options);
        assert_eq!(request.temperature, None);
        assert_eq!(request.max_completion_tokens, Some(350));
    }
}
