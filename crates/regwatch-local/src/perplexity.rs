use regwatch_core::{Error, PromptBackend, PromptRequest, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn perplexity_api_key_from_env() -> Option<String> {
    std::env::var("REGWATCH_PERPLEXITY_API_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            std::env::var("PERPLEXITY_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
}

/// Perplexity chat-completions client backing `PromptBackend`.
#[derive(Debug, Clone)]
pub struct PerplexityClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl PerplexityClient {
    pub fn from_env(client: reqwest::Client, timeout: Duration) -> Result<Self> {
        let api_key = perplexity_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing REGWATCH_PERPLEXITY_API_KEY (or PERPLEXITY_API_KEY)".to_string(),
            )
        })?;
        Ok(Self {
            client,
            api_key,
            model: default_model(),
            timeout,
        })
    }

    fn endpoint_chat_completions() -> String {
        // Docs: https://docs.perplexity.ai/api-reference/chat-completions-post
        //
        // Allow override for testing/debugging (do not include secrets here).
        std::env::var("REGWATCH_PERPLEXITY_ENDPOINT")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "https://api.perplexity.ai/chat/completions".to_string())
    }

    pub async fn chat_completions(
        &self,
        req: ChatCompletionsRequest,
    ) -> Result<ChatCompletionsResponse> {
        let resp = self
            .client
            .post(Self::endpoint_chat_completions())
            .timeout(self.timeout)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Oracle(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Oracle(format!(
                "perplexity chat.completions HTTP {status}"
            )));
        }

        resp.json().await.map_err(|e| Error::Oracle(e.to_string()))
    }
}

fn default_model() -> String {
    std::env::var("REGWATCH_PERPLEXITY_MODEL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "sonar-pro".to_string())
}

#[async_trait::async_trait]
impl PromptBackend for PerplexityClient {
    async fn complete(&self, req: &PromptRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &req.system {
            messages.push(Message {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: req.user.clone(),
        });

        let resp = self
            .chat_completions(ChatCompletionsRequest {
                model: self.model.clone(),
                messages,
                max_tokens: req.max_tokens,
                temperature: req.temperature,
            })
            .await?;

        resp.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Oracle("perplexity response had no choices".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionsResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub index: Option<u64>,
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: String,
}
