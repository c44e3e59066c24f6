use super::traits::{error_detail, looks_like_model_not_found, ModelGateway};
use crate::config::DEFAULT_OPENAI_BASE_URL;
use crate::conversation::Turn;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "openai";

/// Any `/chat/completions` endpoint speaking the OpenAI wire format.
/// Supports a native system role.
pub struct OpenAiCompatibleGateway {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiCompatibleGateway {
    pub fn new(model: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_OPENAI_BASE_URL, model, api_key)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn credential(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            Error::UpstreamUnavailable(
                "no API key configured (set OPENAI_API_KEY or model.api_key)".into(),
            )
        })
    }

    async fn list_models(&self, key: &str) -> Result<Vec<String>> {
        let list: ModelList = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("model listing failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::upstream(format!("model listing failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::upstream(format!("model listing unreadable: {e}")))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl ModelGateway for OpenAiCompatibleGateway {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_system_role(&self) -> bool {
        true
    }

    async fn generate(&self, turns: &[Turn]) -> Result<String> {
        let key = self.credential()?;
        let body = ChatRequest {
            model: &self.model,
            messages: turns
                .iter()
                .map(|t| ChatMessage {
                    role: t.role.as_str(),
                    content: &t.content,
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("chat completion request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::upstream(format!("reading chat completion failed: {e}")))?;

        if !status.is_success() {
            let detail = error_detail(PROVIDER, status, &text);
            let mut available_models = Vec::new();
            if looks_like_model_not_found(status, &detail) {
                match self.list_models(key).await {
                    Ok(models) => available_models = models,
                    Err(e) => tracing::debug!("could not list models: {e}"),
                }
            }
            return Err(Error::Upstream {
                detail,
                available_models,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| Error::upstream(format!("unexpected chat completion: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| Error::upstream("chat completion contained no choices"))
    }
}
