use super::traits::{error_detail, looks_like_model_not_found, ModelGateway};
use crate::config::DEFAULT_GEMINI_BASE_URL;
use crate::conversation::{Role, Turn, SYSTEM_PREFIX};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

const PROVIDER: &str = "gemini";

/// Google Generative Language `generateContent` client.
///
/// The API has no system role in `contents`, so this gateway reports no
/// system-role support and the assembler synthesizes a user/model exchange.
pub struct GeminiGateway {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: Cow<'a, str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
    #[serde(default, rename = "supportedGenerationMethods")]
    supported_generation_methods: Vec<String>,
}

impl GeminiGateway {
    pub fn new(model: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_GEMINI_BASE_URL, model, api_key)
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
                "no Gemini API key configured (set GEMINI_API_KEY or model.api_key)".into(),
            )
        })
    }

    fn to_contents(turns: &[Turn]) -> Vec<Content<'_>> {
        turns
            .iter()
            .map(|turn| {
                let (role, text): (&'static str, Cow<'_, str>) = match turn.role {
                    Role::User => ("user", turn.content.as_str().into()),
                    Role::Assistant => ("model", turn.content.as_str().into()),
                    // Not produced by the assembler for this gateway; folded
                    // into a user turn the same way the persona exchange is.
                    Role::System => ("user", format!("{SYSTEM_PREFIX}{}", turn.content).into()),
                };
                Content {
                    role,
                    parts: vec![Part { text }],
                }
            })
            .collect()
    }

    /// Model ids that support `generateContent`, without the `models/` prefix.
    async fn list_models(&self, key: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-goog-api-key", key)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("model listing failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::upstream(format!("model listing failed: {e}")))?;
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("model listing unreadable: {e}")))?;

        Ok(list
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods.is_empty()
                    || m.supported_generation_methods
                        .iter()
                        .any(|g| g == "generateContent")
            })
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect())
    }

    async fn failure(&self, key: &str, status: reqwest::StatusCode, body: &str) -> Error {
        let detail = error_detail(PROVIDER, status, body);
        let mut available_models = Vec::new();
        if looks_like_model_not_found(status, &detail) {
            match self.list_models(key).await {
                Ok(models) => available_models = models,
                Err(e) => tracing::debug!("could not list Gemini models: {e}"),
            }
        }
        Error::Upstream {
            detail,
            available_models,
        }
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_system_role(&self) -> bool {
        false
    }

    async fn generate(&self, turns: &[Turn]) -> Result<String> {
        let key = self.credential()?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        );
        let body = GenerateRequest {
            contents: Self::to_contents(turns),
        };

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("request to Gemini failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::upstream(format!("reading Gemini response failed: {e}")))?;

        if !status.is_success() {
            return Err(self.failure(key, status, &text).await);
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| Error::upstream(format!("unexpected Gemini response: {e}")))?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::upstream("Gemini returned no candidates"))?;
        let content = candidate.content.ok_or_else(|| {
            Error::upstream(format!(
                "Gemini returned an empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;

        Ok(content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}
